//! Batch command parsing.

use serde_json::{Map, Value};

/// A single entry of the `commands` batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command<'a> {
    /// `["action", action, meta]`
    Action(ActionCommand<'a>),
}

impl<'a> Command<'a> {
    /// Parses a raw batch entry.
    ///
    /// Returns a description of the problem when the entry is not a
    /// recognised command.
    pub fn parse(raw: &'a Value) -> Result<Self, String> {
        let items = raw
            .as_array()
            .ok_or_else(|| String::from("command is not an array"))?;

        match items.first().and_then(Value::as_str) {
            Some("action") => ActionCommand::parse(&items[1..]).map(Command::Action),
            Some(other) => Err(format!("unknown command {other:?}")),
            None => Err(String::from("command name is missing")),
        }
    }
}

/// An `action` command: the action object and its meta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionCommand<'a> {
    action: &'a Map<String, Value>,
    meta: &'a Map<String, Value>,
    action_type: &'a str,
    id: &'a str,
}

impl<'a> ActionCommand<'a> {
    fn parse(args: &'a [Value]) -> Result<Self, String> {
        let [action, meta] = args else {
            return Err(String::from("action command expects action and meta"));
        };
        let action = action
            .as_object()
            .ok_or_else(|| String::from("action is not an object"))?;
        let meta = meta
            .as_object()
            .ok_or_else(|| String::from("meta is not an object"))?;
        let action_type = action
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| String::from("action type is missing"))?;
        let id = meta
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| String::from("meta id is missing"))?;

        Ok(Self {
            action,
            meta,
            action_type,
            id,
        })
    }

    /// Returns the action object.
    pub fn action(&self) -> &'a Map<String, Value> {
        self.action
    }

    /// Returns the action meta.
    pub fn meta(&self) -> &'a Map<String, Value> {
        self.meta
    }

    /// Returns `action.type`.
    pub fn action_type(&self) -> &'a str {
        self.action_type
    }

    /// Returns `meta.id`.
    pub fn id(&self) -> &'a str {
        self.id
    }

    /// Returns `meta.userId` when present.
    pub fn user_id(&self) -> Option<&'a str> {
        self.meta.get("userId").and_then(Value::as_str)
    }
}
