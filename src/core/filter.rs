//! Filter stage applied between the listeners and the sinks

use crate::core::{event::Event, template::Template};
use serde_json::Value;

/// A compiled filter
#[derive(Debug, Clone)]
pub enum Filter {
    /// Set fields to template-rendered values
    AddField(Vec<(String, Template)>),
    /// Drop fields
    RemoveField(Vec<String>),
    /// Append tags to the `tags` array
    AddTag(Vec<String>),
}

impl Filter {
    /// Apply the filter to an event in place
    pub fn apply(&self, event: &mut Event) {
        match self {
            Filter::AddField(fields) => {
                for (name, value) in fields {
                    let rendered = value.resolve(event);
                    event.set(name.clone(), Value::String(rendered));
                }
            }
            Filter::RemoveField(fields) => {
                for name in fields {
                    event.remove(name);
                }
            }
            Filter::AddTag(tags) => {
                let mut current = match event.remove("tags") {
                    Some(Value::Array(items)) => items,
                    Some(Value::String(single)) => vec![Value::String(single)],
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                for tag in tags {
                    let tag = Value::String(tag.clone());
                    if !current.contains(&tag) {
                        current.push(tag);
                    }
                }
                event.set("tags", Value::Array(current));
            }
        }
    }
}

/// Apply a chain of filters in declaration order
pub fn apply_all(filters: &[Filter], event: &mut Event) {
    for filter in filters {
        filter.apply(event);
    }
}
