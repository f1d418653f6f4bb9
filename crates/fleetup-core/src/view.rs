//! In-process table of UI elements shared between the update cycle and
//! whatever redraws the screen.

use std::collections::BTreeMap;

use fleetup_backend::{DisplayState, Face, StatusDisplay};
use log::info;

use crate::rwlock::ReadBiasedLock;

pub const STATUS_ELEMENT: &str = "status";
pub const FACE_ELEMENT: &str = "face";

/// Element name to rendered value.
#[derive(Default)]
pub struct SharedView {
    elements: ReadBiasedLock<BTreeMap<String, String>>,
}

impl SharedView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, element: &str) -> Option<String> {
        self.elements.read().get(element).cloned()
    }

    pub fn set(&self, element: &str, value: impl Into<String>) {
        self.elements
            .write()
            .insert(element.to_string(), value.into());
    }

    /// Consistent copy of every element.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.elements.read().clone()
    }
}

impl StatusDisplay for SharedView {
    fn update(&self, state: DisplayState) {
        if let Some(status) = &state.status {
            let glyph = state.face.map_or("", Face::glyph);
            info!("[update] {glyph} {status}");
        }

        let mut elements = self.elements.write();
        if let Some(status) = state.status {
            elements.insert(STATUS_ELEMENT.to_string(), status);
        }
        if let Some(face) = state.face {
            elements.insert(FACE_ELEMENT.to_string(), face.as_str().to_string());
        }
    }

    fn current(&self) -> DisplayState {
        let elements = self.elements.read();
        DisplayState {
            status: elements.get(STATUS_ELEMENT).cloned(),
            face: elements
                .get(FACE_ELEMENT)
                .and_then(|name| Face::from_name(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use fleetup_backend::{DisplayState, Face, StatusDisplay};

    use super::{FACE_ELEMENT, STATUS_ELEMENT, SharedView};

    #[test]
    fn new_view_reports_unset_state() {
        let view = SharedView::new();

        assert_eq!(view.current(), DisplayState::default());
        assert!(view.snapshot().is_empty());
    }

    #[test]
    fn update_round_trips_through_elements() {
        let view = SharedView::new();

        view.show("Extracting ...", Face::Excited);

        assert_eq!(view.get(STATUS_ELEMENT).as_deref(), Some("Extracting ..."));
        assert_eq!(view.get(FACE_ELEMENT).as_deref(), Some("excited"));
        assert_eq!(view.current(), DisplayState::new("Extracting ...", Face::Excited));
    }

    #[test]
    fn partial_update_keeps_other_element() {
        let view = SharedView::new();
        view.show("Verifying ...", Face::Smart);

        view.update(DisplayState {
            status: Some("Installing ...".to_string()),
            face: None,
        });

        assert_eq!(view.current(), DisplayState::new("Installing ...", Face::Smart));
    }

    #[test]
    fn readers_on_other_threads_see_consistent_snapshots() {
        let view = Arc::new(SharedView::new());
        view.set("uptime", "00:00:01");

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let view = Arc::clone(&view);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let snapshot = view.snapshot();
                        assert!(snapshot.contains_key("uptime"));
                    }
                })
            })
            .collect();

        for i in 0..100 {
            view.set("uptime", format!("00:00:{i:02}"));
        }
        for reader in readers {
            reader.join().expect("reader thread should finish");
        }
        assert_eq!(view.get("uptime").as_deref(), Some("00:00:99"));
    }
}
