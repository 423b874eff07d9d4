//! Geolocation control: locate the user, follow the position in watch mode, report failures.
//!
//! Position lookups run on a background thread through a [`LocationProvider`]; the control is
//! polled once per frame from the UI thread and never blocks. Failures are reported once and are
//! not retried.

use log::{info, warn};
use poll_promise::Promise;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::CLIENT;
use crate::config::AppConfig;
use crate::projection::GeoPos;

/// Title of the control button.
pub const TITLE: &str = "My location";
/// Shown when the user's position is outside the pan bounds.
pub const OUTSIDE_BOUNDS_MSG: &str = "You seem located outside the boundaries of the map";

const FEET_PER_METER: f64 = 3.280_839_9;

/// Why the position could not be determined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    /// Geolocation is disabled or the provider refused to answer.
    #[error("Geolocation permission denied")]
    PermissionDenied,

    /// No position arrived within the configured timeout.
    #[error("Geolocation timed out after {0} s")]
    Timeout(f64),

    /// The provider answered without a usable position.
    #[error("Position unavailable: {0}")]
    Unavailable(String),

    /// The position lies outside the area the map may show.
    #[error("{}", OUTSIDE_BOUNDS_MSG)]
    OutsideBounds,
}

/// A position fix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fix {
    /// Position.
    pub position: GeoPos,
    /// Radius of the uncertainty circle, in meters.
    pub accuracy: f64,
}

/// Something that knows where the user is. Implementations may block; they are always called
/// from a background thread.
pub trait LocationProvider: Send + Sync {
    /// Looks up the current position.
    fn locate(&self) -> Result<Fix, GeolocationError>;
}

/// Answers every lookup with [`GeolocationError::PermissionDenied`].
pub struct DisabledLocationProvider;

impl LocationProvider for DisabledLocationProvider {
    fn locate(&self) -> Result<Fix, GeolocationError> {
        Err(GeolocationError::PermissionDenied)
    }
}

/// Looks the position up from a JSON web service answering `{"latitude": .., "longitude": ..}`.
pub struct HttpLocationProvider {
    url: String,
}

#[derive(Deserialize)]
struct LocationResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    reason: Option<String>,
}

/// Accuracy assumed when the service does not report one (city level).
const DEFAULT_ACCURACY: f64 = 5_000.0;

impl HttpLocationProvider {
    /// Creates a provider querying `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn parse(body: &[u8]) -> Result<Fix, GeolocationError> {
        let response: LocationResponse = serde_json::from_slice(body)
            .map_err(|e| GeolocationError::Unavailable(e.to_string()))?;
        match (response.latitude, response.longitude) {
            (Some(lat), Some(lon)) => Ok(Fix {
                position: GeoPos { lon, lat },
                accuracy: response.accuracy.unwrap_or(DEFAULT_ACCURACY),
            }),
            _ => Err(GeolocationError::Unavailable(
                response
                    .reason
                    .unwrap_or_else(|| "no position in response".to_string()),
            )),
        }
    }
}

impl LocationProvider for HttpLocationProvider {
    fn locate(&self) -> Result<Fix, GeolocationError> {
        let response = CLIENT
            .get(&self.url)
            .send()
            .map_err(|e| GeolocationError::Unavailable(e.to_string()))?;
        match response.status() {
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::UNAUTHORIZED => {
                return Err(GeolocationError::PermissionDenied);
            }
            status if !status.is_success() => {
                return Err(GeolocationError::Unavailable(status.to_string()));
            }
            _ => {}
        }
        let body = response
            .bytes()
            .map_err(|e| GeolocationError::Unavailable(e.to_string()))?;
        Self::parse(&body)
    }
}

/// Options of the geolocation control.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocateOptions {
    /// Seconds to wait for a position before giving up.
    pub timeout: f64,
    /// Seconds a fix stays fresh; in watch mode a new lookup starts when it expires.
    pub maximum_age: f64,
    /// Keep following the position after the first fix.
    pub watch: bool,
    /// Report the accuracy in meters instead of feet.
    pub metric: bool,
    /// Leave the zoom untouched when centering on a fix.
    pub keep_current_zoom: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            timeout: 10.0,
            maximum_age: 10.0,
            watch: true,
            metric: false,
            keep_current_zoom: true,
        }
    }
}

/// Where the control stands.
#[derive(Clone, Debug, PartialEq)]
pub enum LocateState {
    /// Not locating.
    Inactive,
    /// Waiting for a position since `started` (seconds).
    Acquiring {
        /// When the lookup started.
        started: f64,
    },
    /// A position is known and followed.
    Following {
        /// The latest accepted fix.
        fix: Fix,
    },
    /// The last lookup failed; the control stays off until the user asks again.
    Failed(GeolocationError),
}

/// What a poll produced.
#[derive(Clone, Debug, PartialEq)]
pub enum LocateUpdate {
    /// A fix was accepted and the map should center on it.
    Fix(Fix),
    /// A fix arrived while the map was busy and was discarded.
    Dropped,
    /// The lookup failed.
    Failed(GeolocationError),
}

/// The geolocation control.
pub struct LocateControl {
    provider: Arc<dyn LocationProvider>,
    options: LocateOptions,
    state: LocateState,
    pending: Option<(f64, Promise<Result<Fix, GeolocationError>>)>,
    next_lookup: Option<f64>,
}

impl LocateControl {
    /// Creates a control asking `provider` for positions.
    pub fn new(provider: impl LocationProvider + 'static, options: LocateOptions) -> Self {
        Self {
            provider: Arc::new(provider),
            options,
            state: LocateState::Inactive,
            pending: None,
            next_lookup: None,
        }
    }

    /// The portal's control: the configured web service, or disabled without one.
    pub fn from_config(config: &AppConfig) -> Self {
        match &config.geolocation_url {
            Some(url) => Self::new(HttpLocationProvider::new(url.clone()), LocateOptions::default()),
            None => Self::new(DisabledLocationProvider, LocateOptions::default()),
        }
    }

    /// The control options.
    pub fn options(&self) -> &LocateOptions {
        &self.options
    }

    /// The current state.
    pub fn state(&self) -> &LocateState {
        &self.state
    }

    /// Whether the control is acquiring or following.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            LocateState::Acquiring { .. } | LocateState::Following { .. }
        )
    }

    /// Starts locating, unless already active.
    pub fn start(&mut self, now: f64) {
        if self.is_active() {
            return;
        }
        info!("Locating the user");
        self.spawn_lookup(now);
    }

    /// Stops locating and forgets the position.
    pub fn stop(&mut self) {
        self.pending = None;
        self.next_lookup = None;
        self.state = LocateState::Inactive;
    }

    /// Switches between [`Self::start`] and [`Self::stop`].
    pub fn toggle(&mut self, now: f64) {
        if self.is_active() {
            self.stop();
        } else {
            self.start(now);
        }
    }

    /// Stops with a failure found by the caller, e.g. a fix outside the map.
    pub fn fail(&mut self, error: GeolocationError) {
        warn!("Geolocation failed: {}", error);
        self.pending = None;
        self.next_lookup = None;
        self.state = LocateState::Failed(error);
    }

    fn spawn_lookup(&mut self, now: f64) {
        let provider = self.provider.clone();
        let promise = Promise::spawn_thread("locate", move || provider.locate());
        self.pending = Some((now, promise));
        self.next_lookup = None;
        if !matches!(self.state, LocateState::Following { .. }) {
            self.state = LocateState::Acquiring { started: now };
        }
    }

    /// Advances the control. `busy` is true while the map view is being moved by the user;
    /// fixes arriving then are dropped.
    pub fn poll(&mut self, now: f64, busy: bool) -> Option<LocateUpdate> {
        if let Some((started, promise)) = &self.pending {
            let started = *started;
            let Some(result) = promise.ready() else {
                if now - started > self.options.timeout {
                    self.fail(GeolocationError::Timeout(self.options.timeout));
                    return Some(LocateUpdate::Failed(GeolocationError::Timeout(
                        self.options.timeout,
                    )));
                }
                return None;
            };
            let result = result.clone();
            self.pending = None;

            return match result {
                Ok(_) if busy => {
                    warn!("Dropping position fix received while the map is moving");
                    self.schedule_next(now);
                    Some(LocateUpdate::Dropped)
                }
                Ok(fix) => {
                    self.state = LocateState::Following { fix };
                    self.schedule_next(now);
                    Some(LocateUpdate::Fix(fix))
                }
                Err(e) => {
                    self.fail(e.clone());
                    Some(LocateUpdate::Failed(e))
                }
            };
        }

        if let Some(at) = self.next_lookup {
            if now >= at {
                self.spawn_lookup(now);
            }
        }
        None
    }

    fn schedule_next(&mut self, now: f64) {
        self.next_lookup = self.options.watch.then_some(now + self.options.maximum_age);
    }

    /// The text shown next to the position marker.
    pub fn popup_text(&self, fix: &Fix) -> String {
        let (distance, unit) = if self.options.metric {
            (fix.accuracy, "meters")
        } else {
            (fix.accuracy * FEET_PER_METER, "feet")
        };
        format!(
            "You are within {:.0} {} from this point",
            distance, unit
        )
    }
}
