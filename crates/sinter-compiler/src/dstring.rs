//! D-string template analysis.
//!
//! A D-string literal like `D"The count is: {count}"` is split into literal
//! text and substitution slots. The resolver binds each referenced name, the
//! checker types it, and the code generator emits a descriptor whose slots
//! index into the reference list. Repeated references to the same variable
//! share one slot index, so the runtime snapshots each location once.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SLOT_PATTERN: Regex =
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("slot pattern");
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text, emitted verbatim.
    Text(String),
    /// Index into [`Template::refs`].
    Slot(usize),
}

/// A parsed D-string template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub segments: Vec<Segment>,
    /// Referenced variable names, first occurrence order, deduplicated.
    pub refs: Vec<String>,
}

/// Split a raw D-string body into segments and references.
pub fn parse(raw: &str) -> Template {
    let mut template = Template::default();
    let mut cursor = 0;
    for caps in SLOT_PATTERN.captures_iter(raw) {
        let whole = caps.get(0).expect("whole match");
        let name = &caps[1];
        if whole.start() > cursor {
            template
                .segments
                .push(Segment::Text(raw[cursor..whole.start()].to_string()));
        }
        let index = match template.refs.iter().position(|r| r == name) {
            Some(index) => index,
            None => {
                template.refs.push(name.to_string());
                template.refs.len() - 1
            }
        };
        template.segments.push(Segment::Slot(index));
        cursor = whole.end();
    }
    if cursor < raw.len() {
        template
            .segments
            .push(Segment::Text(raw[cursor..].to_string()));
    }
    template
}
