//! Weak references to objects owned elsewhere (senders, related entities).
//!
//! A reference is only a type tag and a numeric id. Nothing here owns the
//! referenced object: it may disappear at any time, in which case resolving
//! the reference simply yields nothing.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use herald_shared::errors::{AppError, AppResult, ErrorCode};
use herald_shared::types::event::payloads::ObjectRefPayload;

pub const SYSTEM_TYPE: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: i64,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: i64) -> Self {
        Self {
            object_type: object_type.into(),
            object_id,
        }
    }

    /// Reference to any [`Referable`] value.
    pub fn of<T: Referable + ?Sized>(object: &T) -> Self {
        Self::new(object.content_type(), object.object_id())
    }

    /// The built-in system sender.
    pub fn system() -> Self {
        Self::new(SYSTEM_TYPE, 0)
    }

    /// Build a reference from separately supplied form fields.
    ///
    /// Both halves must be present together; supplying only one of them is a
    /// validation error. Neither present means "no reference".
    pub fn from_parts(object_type: Option<&str>, object_id: Option<i64>) -> AppResult<Option<Self>> {
        let object_type = object_type.map(str::trim).filter(|t| !t.is_empty());
        match (object_type, object_id) {
            (Some(t), Some(id)) => {
                if id < 0 {
                    return Err(AppError::new(
                        ErrorCode::InvalidSenderReference,
                        "object id must not be negative",
                    ));
                }
                Ok(Some(Self::new(t, id)))
            }
            (Some(_), None) => Err(AppError::new(
                ErrorCode::InvalidSenderReference,
                "You must specify an object ID for the selected sender type.",
            )),
            (None, Some(_)) => Err(AppError::new(
                ErrorCode::InvalidSenderReference,
                "You must select a sender type if providing an object ID.",
            )),
            (None, None) => Ok(None),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

impl From<ObjectRefPayload> for ObjectRef {
    fn from(payload: ObjectRefPayload) -> Self {
        Self::new(payload.object_type, payload.object_id)
    }
}

/// Anything that can be the sender or subject of a notification.
pub trait Referable {
    fn content_type(&self) -> &str;
    fn object_id(&self) -> i64;
}

impl Referable for ObjectRef {
    fn content_type(&self) -> &str {
        &self.object_type
    }

    fn object_id(&self) -> i64 {
        self.object_id
    }
}

/// Looks referenced objects up for display. Returning `None` means the object
/// is gone or unknown, which is never an error.
pub trait ObjectResolver: Send + Sync {
    fn resolve(&self, reference: &ObjectRef) -> Option<String>;
}

/// Resolver that renders every reference as `type:id` without a lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagResolver;

impl ObjectResolver for TagResolver {
    fn resolve(&self, reference: &ObjectRef) -> Option<String> {
        Some(reference.to_string())
    }
}

/// Fixed label table, handy for seeding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    labels: HashMap<ObjectRef, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: ObjectRef, label: impl Into<String>) -> Self {
        self.labels.insert(reference, label.into());
        self
    }

    pub fn forget(&mut self, reference: &ObjectRef) {
        self.labels.remove(reference);
    }
}

impl ObjectResolver for StaticResolver {
    fn resolve(&self, reference: &ObjectRef) -> Option<String> {
        self.labels.get(reference).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Post {
        id: i64,
    }

    impl Referable for Post {
        fn content_type(&self) -> &str {
            "post"
        }

        fn object_id(&self) -> i64 {
            self.id
        }
    }

    #[test]
    fn reference_of_referable() {
        let reference = ObjectRef::of(&Post { id: 42 });
        assert_eq!(reference, ObjectRef::new("post", 42));
        assert_eq!(reference.to_string(), "post:42");
    }

    #[test]
    fn from_parts_requires_both_halves() {
        let err = ObjectRef::from_parts(Some("user"), None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidSenderReference));
        assert!(err.to_string().contains("object ID"));

        let err = ObjectRef::from_parts(None, Some(7)).unwrap_err();
        assert!(err.to_string().contains("sender type"));

        assert_eq!(ObjectRef::from_parts(None, None).unwrap(), None);
        assert_eq!(
            ObjectRef::from_parts(Some("user"), Some(7)).unwrap(),
            Some(ObjectRef::new("user", 7))
        );
    }

    #[test]
    fn blank_type_counts_as_missing() {
        let err = ObjectRef::from_parts(Some("  "), Some(3)).unwrap_err();
        assert!(err.to_string().contains("sender type"));
    }

    #[test]
    fn forgotten_object_resolves_to_nothing() {
        let post = ObjectRef::new("post", 42);
        let mut resolver = StaticResolver::new().with(post.clone(), "Great Tips");
        assert_eq!(resolver.resolve(&post).as_deref(), Some("Great Tips"));

        resolver.forget(&post);
        assert_eq!(resolver.resolve(&post), None);
    }
}
