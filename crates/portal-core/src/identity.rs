//! Component references.
//!
//! Callers address a component as `appId:component`, `appId / component`, or
//! a bare component name that lives in the default application. Component
//! names that themselves contain `:` or ` / ` cannot be told apart from a
//! composite reference; the first separator always wins.

use std::fmt;

use crate::error::{PortalError, PortalResult};

pub const ID_SEPARATOR: char = ':';
pub const DISPLAY_SEPARATOR: &str = " / ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    pub app_id: String,
    pub component: String,
}

impl ComponentRef {
    pub fn new(app_id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            component: component.into(),
        }
    }

    /// `<appName> / <component>` as shown in listings.
    pub fn display_name(app_name: &str, component: &str) -> String {
        format!("{app_name}{DISPLAY_SEPARATOR}{component}")
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.app_id, ID_SEPARATOR, self.component)
    }
}

pub fn resolve(reference: &str, default_app_id: &str) -> PortalResult<ComponentRef> {
    let (app_id, component) = if let Some((app, rest)) = reference.split_once(ID_SEPARATOR) {
        (app, rest)
    } else if let Some((app, rest)) = reference.split_once(DISPLAY_SEPARATOR) {
        (app, rest)
    } else {
        (default_app_id, reference)
    };

    if app_id.is_empty() {
        return Err(PortalError::identity(reference, "app id missing"));
    }

    Ok(ComponentRef::new(app_id, component))
}
