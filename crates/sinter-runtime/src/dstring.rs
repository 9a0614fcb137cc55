//! The D-string record.
//!
//! A D-string holds its template, the addresses of the variables it
//! references, a cached rendered text, and a snapshot of each referenced
//! value as of the last render. Reading the record compares the current
//! values against the snapshots and re-renders only when something changed -
//! writes to the referenced variables never touch the record.

use crate::value::{Address, Value};

/// One piece of a D-string template.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    /// Index into the reference list.
    Slot(usize),
}

/// A live D-string record.
#[derive(Debug)]
pub struct DString {
    pieces: Vec<Piece>,
    refs: Vec<Address>,
    cache: Option<String>,
    snapshots: Vec<Value>,
    renders: u32,
}

impl DString {
    pub fn new(pieces: Vec<Piece>, refs: Vec<Address>) -> Self {
        Self {
            pieces,
            refs,
            cache: None,
            snapshots: Vec::new(),
            renders: 0,
        }
    }

    /// The referenced addresses, in slot order.
    pub fn refs(&self) -> &[Address] {
        &self.refs
    }

    /// How many times this record has re-rendered; a second read with
    /// unchanged inputs must not bump this.
    pub fn renders(&self) -> u32 {
        self.renders
    }

    /// Read the text. `current` are the referenced locations' present values
    /// and `rendered` their textual forms, both in slot order.
    pub fn read(&mut self, current: Vec<Value>, rendered: &[String]) -> String {
        let stale = self.cache.is_none() || self.snapshots != current;
        if stale {
            let mut out = String::new();
            for piece in &self.pieces {
                match piece {
                    Piece::Text(text) => out.push_str(text),
                    Piece::Slot(slot) => out.push_str(&rendered[*slot]),
                }
            }
            self.cache = Some(out);
            self.snapshots = current;
            self.renders += 1;
        }
        self.cache.clone().expect("cache filled above")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_template() -> DString {
        DString::new(
            vec![Piece::Text("The count is: ".into()), Piece::Slot(0)],
            vec![Address::Cell(0)],
        )
    }

    #[test]
    fn first_read_renders() {
        let mut d = counter_template();
        let text = d.read(vec![Value::Int(0)], &["0".into()]);
        assert_eq!(text, "The count is: 0");
        assert_eq!(d.renders(), 1);
    }

    #[test]
    fn unchanged_read_reuses_the_cache() {
        let mut d = counter_template();
        d.read(vec![Value::Int(5)], &["5".into()]);
        let again = d.read(vec![Value::Int(5)], &["5".into()]);
        assert_eq!(again, "The count is: 5");
        assert_eq!(d.renders(), 1, "second read must not re-render");
    }

    #[test]
    fn changed_value_triggers_exactly_one_rerender() {
        let mut d = counter_template();
        d.read(vec![Value::Int(0)], &["0".into()]);
        let text = d.read(vec![Value::Int(42)], &["42".into()]);
        assert_eq!(text, "The count is: 42");
        assert_eq!(d.renders(), 2);
    }

    #[test]
    fn shared_slot_renders_once_per_reference() {
        let mut d = DString::new(
            vec![Piece::Slot(0), Piece::Text(" and ".into()), Piece::Slot(0)],
            vec![Address::Cell(3)],
        );
        let text = d.read(vec![Value::Int(7)], &["7".into()]);
        assert_eq!(text, "7 and 7");
    }
}
