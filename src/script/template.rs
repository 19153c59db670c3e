use crate::script::RenderError;
use crate::script::quote::shell_quote;
use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(PartialEq, Debug, Clone)]
enum Segment {
    Text(String),
    Placeholder(String),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScriptTemplate {
    segments: Vec<Segment>,
}

impl ScriptTemplate {
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }

            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| RenderError::Unterminated {
                offset: source.len() - rest.len() + start,
            })?;

            let name = &after_open[..end];
            if !is_placeholder_name(name) {
                return Err(RenderError::InvalidPlaceholder(name.to_string()));
            }

            segments.push(Segment::Placeholder(name.to_string()));
            rest = &after_open[end + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(ScriptTemplate { segments })
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    pub fn render(&self, bindings: &BTreeMap<&str, String>) -> Result<String, RenderError> {
        let mut script = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => script.push_str(text),
                Segment::Placeholder(name) => {
                    let value = bindings
                        .get(name.as_str())
                        .ok_or_else(|| RenderError::Unbound(name.clone()))?;
                    script.push_str(&shell_quote(value));
                }
            }
        }
        Ok(script)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
