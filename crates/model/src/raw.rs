use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A provider-shaped history message that the agent never inspects.
///
/// The two supported wire protocols record an assistant tool-call turn
/// in different message shapes, and those shapes must survive into the
/// next request verbatim. `RawMessage` lets a provider stash its own
/// wire type in the history and later downcast it back when serializing
/// the follow-up request. The shapes are deliberately kept separate
/// serialization rules; there is no common denominator type.
pub struct RawMessage {
    id: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl RawMessage {
    /// Creates a new `RawMessage` wrapping a provider wire type.
    ///
    /// The `id` identifies the message and should be unique across the
    /// conversation; equality and hashing only consider the `id`.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        Self {
            id: id.into(),
            value: Arc::new(value),
        }
    }

    /// Returns the identifier of this message.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Borrows the wrapped value as its concrete wire type.
    ///
    /// Returns `None` when the message was produced by a different
    /// provider than the caller.
    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl Clone for RawMessage {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl Debug for RawMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMessage").field("id", &self.id).finish()
    }
}

impl PartialEq for RawMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RawMessage {}

impl Hash for RawMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
