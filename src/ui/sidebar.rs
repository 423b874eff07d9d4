//! The collapsible sidebar and its width transition.

/// Length of the open/close transition, in seconds.
pub const TRANSITION_SECS: f64 = 0.35;

/// Where the sidebar stands. Times are seconds on the UI clock (`egui::InputState::time`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SidebarState {
    /// Not shown.
    Closed,
    /// Fully shown.
    Open,
    /// Moving towards `target` since `started`.
    Animating {
        /// `true` when opening.
        target: bool,
        /// When the transition began.
        started: f64,
    },
}

/// The sidebar state machine.
#[derive(Clone, Debug)]
pub struct Sidebar {
    state: SidebarState,
}

impl Sidebar {
    /// Creates a sidebar, open or closed.
    pub fn new(open: bool) -> Self {
        Self {
            state: if open {
                SidebarState::Open
            } else {
                SidebarState::Closed
            },
        }
    }

    /// The current state.
    pub fn state(&self) -> SidebarState {
        self.state
    }

    /// Whether the sidebar is fully open.
    pub fn is_open(&self) -> bool {
        self.state == SidebarState::Open
    }

    /// Starts a transition towards the opposite state. Ignored while a transition is running;
    /// returns whether one was started.
    pub fn toggle(&mut self, now: f64) -> bool {
        let target = match self.state {
            SidebarState::Closed => true,
            SidebarState::Open => false,
            SidebarState::Animating { .. } => return false,
        };
        self.state = SidebarState::Animating {
            target,
            started: now,
        };
        true
    }

    /// Finishes a transition whose time is up. Returns `true` exactly once per transition, on the
    /// call that finishes it.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.state {
            SidebarState::Animating { target, started } if now - started >= TRANSITION_SECS => {
                self.state = if target {
                    SidebarState::Open
                } else {
                    SidebarState::Closed
                };
                true
            }
            _ => false,
        }
    }

    /// Fraction of the full width currently shown, eased.
    pub fn width_fraction(&self, now: f64) -> f32 {
        match self.state {
            SidebarState::Closed => 0.0,
            SidebarState::Open => 1.0,
            SidebarState::Animating { target, started } => {
                let t = ((now - started) / TRANSITION_SECS).clamp(0.0, 1.0);
                let eased = t * t * (3.0 - 2.0 * t);
                let opened = if target { eased } else { 1.0 - eased };
                opened as f32
            }
        }
    }
}
