//! The navigation bar search box.

use egui::text::{CCursor, CCursorRange};
use egui::{Key, Response, Ui};

/// A single-line search field. Clicking it selects the whole text; Enter does nothing.
#[derive(Clone, Debug, Default)]
pub struct SearchBox {
    text: String,
}

impl SearchBox {
    /// The current text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Draws the field.
    pub fn show(&mut self, ui: &mut Ui) -> Response {
        let output = egui::TextEdit::singleline(&mut self.text)
            .hint_text("Search")
            .return_key(None)
            .desired_width(180.0)
            .show(ui);
        let response = output.response;

        if response.clicked() {
            let mut state = output.state;
            let end = CCursor::new(self.text.chars().count());
            state
                .cursor
                .set_char_range(Some(CCursorRange::two(CCursor::new(0), end)));
            state.store(ui.ctx(), response.id);
        }
        // Keep focus when Enter is pressed.
        if response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
            response.request_focus();
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Context, Event, Id, Modifiers, PointerButton, Pos2, RawInput, Rect, vec2};

    fn frame(ctx: &Context, search: &mut SearchBox, events: Vec<Event>) -> (Id, Rect) {
        let input = RawInput {
            screen_rect: Some(Rect::from_min_size(Pos2::ZERO, vec2(800.0, 600.0))),
            events,
            ..Default::default()
        };
        let mut field = None;
        let _ = ctx.run(input, |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                let response = search.show(ui);
                field = Some((response.id, response.rect));
            });
        });
        field.unwrap()
    }

    fn button(pos: Pos2, pressed: bool) -> Event {
        Event::PointerButton {
            pos,
            button: PointerButton::Primary,
            pressed,
            modifiers: Modifiers::NONE,
        }
    }

    fn click(ctx: &Context, search: &mut SearchBox) -> Id {
        let (_, rect) = frame(ctx, search, vec![]);
        let pos = rect.center();
        frame(ctx, search, vec![Event::PointerMoved(pos), button(pos, true)]);
        let (id, _) = frame(ctx, search, vec![button(pos, false)]);
        id
    }

    #[test]
    fn enter_keeps_text_and_focus() {
        let ctx = Context::default();
        let mut search = SearchBox::default();
        let id = click(&ctx, &mut search);

        frame(&ctx, &mut search, vec![Event::Text("Lausanne".to_string())]);
        assert_eq!(search.text(), "Lausanne");

        let enter = Event::Key {
            key: Key::Enter,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers: Modifiers::NONE,
        };
        frame(&ctx, &mut search, vec![enter]);
        frame(&ctx, &mut search, vec![]);
        assert_eq!(search.text(), "Lausanne");
        assert!(ctx.memory(|m| m.has_focus(id)));
    }

    #[test]
    fn click_selects_all() {
        let ctx = Context::default();
        let mut search = SearchBox::default();
        search.set_text("Bern");
        let id = click(&ctx, &mut search);

        let state = egui::TextEdit::load_state(&ctx, id).unwrap();
        let range = state.cursor.char_range().unwrap();
        let mut ends = [range.primary.index, range.secondary.index];
        ends.sort();
        assert_eq!(ends, [0, 4]);
    }
}
