//! Error Types
//!
//! Every failure the store and selector engine can surface is described here.
//!
//! # Taxonomy
//!
//! - [`ReducerError`]: a reducer failed or panicked while handling an action.
//!   The dispatch is abandoned and the state is left untouched.
//! - [`SubscriberError`]: a notified callback failed or panicked. Collected
//!   per callback so one failure never blocks the others.
//! - [`SelectError`]: a combiner failed during a cache miss. The selector's
//!   cache keeps its previous entry.
//! - [`StoreError`]: what `Store::dispatch` hands back to its caller.

use std::any::Any;
use std::borrow::Cow;

use thiserror::Error;

use crate::store::SubscriberId;

/// Boxed error returned by user-supplied reducers, combiners and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure while building or decoding an action payload.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to encode payload for action `{kind}`: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode payload of action `{kind}`: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure inside the reducer chain.
#[derive(Debug, Error)]
pub enum ReducerError {
    #[error("reducer{} failed on action `{kind}`: {source}", slice_label(.slice))]
    Failed {
        slice: Option<Cow<'static, str>>,
        kind: String,
        #[source]
        source: BoxError,
    },

    #[error("reducer{} panicked on action `{kind}`: {message}", slice_label(.slice))]
    Panicked {
        slice: Option<Cow<'static, str>>,
        kind: String,
        message: String,
    },

    #[error("state tree has no slice named `{slice}`")]
    MissingSlice { slice: Cow<'static, str> },

    #[error("slice `{slice}` does not hold a `{expected}`")]
    SliceType {
        slice: Cow<'static, str>,
        expected: &'static str,
    },
}

impl ReducerError {
    /// Wrap a user error raised by a reducer.
    pub fn failed(kind: &str, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            slice: None,
            kind: kind.to_string(),
            source: source.into(),
        }
    }

    /// Attach a slice name if none has been recorded yet.
    pub(crate) fn in_slice(self, name: &Cow<'static, str>) -> Self {
        match self {
            Self::Failed {
                slice: None,
                kind,
                source,
            } => Self::Failed {
                slice: Some(name.clone()),
                kind,
                source,
            },
            Self::Panicked {
                slice: None,
                kind,
                message,
            } => Self::Panicked {
                slice: Some(name.clone()),
                kind,
                message,
            },
            other => other,
        }
    }
}

fn slice_label(slice: &Option<Cow<'static, str>>) -> String {
    match slice {
        Some(name) => format!(" for slice `{name}`"),
        None => String::new(),
    }
}

/// Failure raised by a single subscriber during notification.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("subscriber {id:?} failed: {source}")]
    Failed {
        id: SubscriberId,
        #[source]
        source: BoxError,
    },

    #[error("subscriber {id:?} panicked: {message}")]
    Panicked { id: SubscriberId, message: String },
}

impl SubscriberError {
    /// The subscriber that failed.
    pub fn subscriber(&self) -> SubscriberId {
        match self {
            Self::Failed { id, .. } | Self::Panicked { id, .. } => *id,
        }
    }
}

/// Failure while computing a selector's value.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("selector `{selector}` failed to compute: {source}")]
    Compute {
        selector: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    #[error("slice `{slice}` is missing or does not hold a `{expected}`")]
    Slice {
        slice: Cow<'static, str>,
        expected: &'static str,
    },
}

/// Errors returned by [`Store::dispatch`](crate::store::Store::dispatch).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Reducer(#[from] ReducerError),

    #[error("re-entrant dispatch of `{kind}` while `{active}` is still notifying")]
    ReentrantDispatch { kind: String, active: String },

    #[error("{} subscriber(s) failed during notification", .errors.len())]
    Subscribers { errors: Vec<SubscriberError> },
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
