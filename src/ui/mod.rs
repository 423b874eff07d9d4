//! Navigation bar, sidebar and dialog state of the viewer application.
//!
//! The [`UiController`] maps button presses onto three capabilities: showing dialogs
//! ([`ModalService`]), moving the sidebar ([`SidebarService`]) and telling the map its container
//! changed size ([`ViewportService`]). Missing targets are silent no-ops.

use log::debug;
use std::collections::BTreeSet;

/// The search box of the navigation bar.
pub mod search;
/// The animated sidebar.
pub mod sidebar;

use sidebar::{Sidebar, SidebarState};

/// The viewer's dialogs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DialogId {
    /// Version and credits.
    About,
    /// Legend images of the WMS layers.
    Legend,
    /// Login form.
    Login,
    /// Usage help.
    Help,
    /// WMS endpoint and catalogue records.
    WebServices,
    /// Story map links.
    StoryMaps,
}

impl DialogId {
    /// Every dialog, in navigation bar order.
    pub const ALL: [DialogId; 6] = [
        DialogId::About,
        DialogId::Legend,
        DialogId::Login,
        DialogId::Help,
        DialogId::WebServices,
        DialogId::StoryMaps,
    ];

    /// Dialog title.
    pub fn title(&self) -> &'static str {
        match self {
            DialogId::About => "About",
            DialogId::Legend => "Legend",
            DialogId::Login => "Login",
            DialogId::Help => "Help",
            DialogId::WebServices => "Web services",
            DialogId::StoryMaps => "Story maps",
        }
    }
}

/// A clickable element of the page chrome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonId {
    /// Opens a dialog.
    Dialog(DialogId),
    /// The navigation bar list button.
    List,
    /// The sidebar toggle in the navigation bar.
    SidebarToggle,
    /// The hide button inside the sidebar.
    SidebarHide,
    /// Expands or collapses the mobile navigation menu.
    Nav,
}

impl ButtonId {
    /// Every button.
    pub const ALL: [ButtonId; 10] = [
        ButtonId::Dialog(DialogId::About),
        ButtonId::Dialog(DialogId::Legend),
        ButtonId::Dialog(DialogId::Login),
        ButtonId::Dialog(DialogId::Help),
        ButtonId::Dialog(DialogId::WebServices),
        ButtonId::Dialog(DialogId::StoryMaps),
        ButtonId::List,
        ButtonId::SidebarToggle,
        ButtonId::SidebarHide,
        ButtonId::Nav,
    ];

    /// Looks a button up by its element id, e.g. `about-btn`.
    pub fn from_element_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.element_id() == id)
    }

    /// The element id of the button.
    pub fn element_id(&self) -> &'static str {
        match self {
            ButtonId::Dialog(DialogId::About) => "about-btn",
            ButtonId::Dialog(DialogId::Legend) => "legend-btn",
            ButtonId::Dialog(DialogId::Login) => "login-btn",
            ButtonId::Dialog(DialogId::Help) => "help-btn",
            ButtonId::Dialog(DialogId::WebServices) => "webservices-btn",
            ButtonId::Dialog(DialogId::StoryMaps) => "storymaps-btn",
            ButtonId::List => "list-btn",
            ButtonId::SidebarToggle => "sidebar-toggle-btn",
            ButtonId::SidebarHide => "sidebar-hide-btn",
            ButtonId::Nav => "nav-btn",
        }
    }
}

/// Shows and hides dialogs.
pub trait ModalService {
    /// Shows `dialog`. Showing an open dialog keeps it open.
    fn show(&mut self, dialog: DialogId);

    /// Hides `dialog`.
    fn hide(&mut self, dialog: DialogId);

    /// Whether `dialog` is open.
    fn is_open(&self, dialog: DialogId) -> bool;
}

/// Moves the sidebar.
pub trait SidebarService {
    /// Starts a transition; returns `false` when one is already running.
    fn toggle(&mut self, now: f64) -> bool;

    /// Finishes a transition whose time is up; returns `true` on the call that finishes it.
    fn poll(&mut self, now: f64) -> bool;

    /// The current state.
    fn state(&self) -> SidebarState;
}

/// Something whose size follows the layout, e.g. the map.
pub trait ViewportService {
    /// The container changed size; re-measure on the next frame.
    fn resize(&mut self);
}

/// The set of open dialogs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DialogSet {
    open: BTreeSet<DialogId>,
}

impl DialogSet {
    /// The open dialogs.
    pub fn open(&self) -> impl Iterator<Item = DialogId> + '_ {
        self.open.iter().copied()
    }
}

impl ModalService for DialogSet {
    fn show(&mut self, dialog: DialogId) {
        self.open.insert(dialog);
    }

    fn hide(&mut self, dialog: DialogId) {
        self.open.remove(&dialog);
    }

    fn is_open(&self, dialog: DialogId) -> bool {
        self.open.contains(&dialog)
    }
}

impl SidebarService for Sidebar {
    fn toggle(&mut self, now: f64) -> bool {
        Sidebar::toggle(self, now)
    }

    fn poll(&mut self, now: f64) -> bool {
        Sidebar::poll(self, now)
    }

    fn state(&self) -> SidebarState {
        Sidebar::state(self)
    }
}

/// Routes button presses to dialogs, the sidebar and the mobile navigation menu.
pub struct UiController<M, S> {
    modals: M,
    sidebar: S,
    nav_expanded: bool,
}

impl<M: ModalService, S: SidebarService> UiController<M, S> {
    /// Creates a controller over the given services.
    pub fn new(modals: M, sidebar: S) -> Self {
        Self {
            modals,
            sidebar,
            nav_expanded: false,
        }
    }

    /// The dialogs.
    pub fn modals(&self) -> &M {
        &self.modals
    }

    /// The dialogs, mutably, e.g. to close one from its own close button.
    pub fn modals_mut(&mut self) -> &mut M {
        &mut self.modals
    }

    /// The sidebar.
    pub fn sidebar(&self) -> &S {
        &self.sidebar
    }

    /// Whether the mobile navigation menu is expanded.
    pub fn nav_expanded(&self) -> bool {
        self.nav_expanded
    }

    /// Handles a press of `button` at time `now`.
    pub fn click(&mut self, button: ButtonId, now: f64) {
        debug!("Clicked {}", button.element_id());
        match button {
            ButtonId::Dialog(dialog) => {
                self.modals.show(dialog);
                self.nav_expanded = false;
            }
            ButtonId::List | ButtonId::SidebarToggle | ButtonId::SidebarHide => {
                if !self.sidebar.toggle(now) {
                    debug!("Sidebar is moving, ignoring toggle");
                }
            }
            ButtonId::Nav => self.nav_expanded = !self.nav_expanded,
        }
    }

    /// Handles a press of the element with id `element_id`; unknown ids are ignored.
    pub fn click_element(&mut self, element_id: &str, now: f64) {
        if let Some(button) = ButtonId::from_element_id(element_id) {
            self.click(button, now);
        }
    }

    /// Advances the sidebar transition; once it completes, tells `viewport` to resize.
    pub fn tick(&mut self, now: f64, viewport: &mut dyn ViewportService) {
        if self.sidebar.poll(now) {
            viewport.resize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingViewport {
        resizes: usize,
    }

    impl ViewportService for CountingViewport {
        fn resize(&mut self) {
            self.resizes += 1;
        }
    }

    fn controller() -> UiController<DialogSet, Sidebar> {
        UiController::new(DialogSet::default(), Sidebar::new(false))
    }

    #[test]
    fn element_ids_round_trip() {
        for button in ButtonId::ALL {
            assert_eq!(ButtonId::from_element_id(button.element_id()), Some(button));
        }
        assert_eq!(ButtonId::from_element_id("print-btn"), None);
    }

    #[test]
    fn about_twice_stays_open() {
        let mut ui = controller();
        ui.click_element("about-btn", 0.0);
        ui.click_element("about-btn", 0.1);
        assert!(ui.modals().is_open(DialogId::About));
        assert_eq!(ui.modals().open().count(), 1);
    }

    #[test]
    fn dialog_collapses_navigation() {
        let mut ui = controller();
        ui.click(ButtonId::Nav, 0.0);
        assert!(ui.nav_expanded());
        ui.click(ButtonId::Dialog(DialogId::Legend), 0.1);
        assert!(!ui.nav_expanded());
        assert!(ui.modals().is_open(DialogId::Legend));
    }

    #[test]
    fn unknown_element_is_ignored() {
        let mut ui = controller();
        ui.click_element("nope", 0.0);
        assert_eq!(ui.modals().open().count(), 0);
        assert_eq!(ui.sidebar().state(), SidebarState::Closed);
    }

    #[test]
    fn sidebar_opens_then_resizes_once() {
        let mut ui = controller();
        let mut viewport = CountingViewport::default();

        ui.click(ButtonId::SidebarToggle, 0.0);
        assert_eq!(
            ui.sidebar().state(),
            SidebarState::Animating {
                target: true,
                started: 0.0
            }
        );
        ui.tick(0.2, &mut viewport);
        assert_eq!(viewport.resizes, 0);

        ui.tick(0.4, &mut viewport);
        assert_eq!(ui.sidebar().state(), SidebarState::Open);
        assert_eq!(viewport.resizes, 1);

        ui.tick(1.0, &mut viewport);
        assert_eq!(viewport.resizes, 1);
    }

    #[test]
    fn toggles_during_transition_are_ignored() {
        let mut ui = controller();
        let mut viewport = CountingViewport::default();

        ui.click(ButtonId::List, 0.0);
        ui.click(ButtonId::SidebarHide, 0.1);
        ui.tick(0.4, &mut viewport);
        assert_eq!(ui.sidebar().state(), SidebarState::Open);
        assert_eq!(viewport.resizes, 1);

        ui.click(ButtonId::SidebarHide, 0.5);
        ui.tick(0.9, &mut viewport);
        assert_eq!(ui.sidebar().state(), SidebarState::Closed);
        assert_eq!(viewport.resizes, 2);
    }
}
