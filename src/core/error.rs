use crate::core::Value;
use crate::property::Property;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Raised when a committed attribute fails validation.
///
/// Carries the offending descriptor so callers can report which attribute
/// blocked the write.
#[derive(Error, Clone)]
#[error("Invalid value {value:?} for property '{model}.{name}'", name = .property.name(), model = .property.model_name())]
pub struct InvalidValueError {
    pub property: Rc<Property>,
    pub value: Value,
}

impl InvalidValueError {
    pub fn new(property: Rc<Property>, value: Value) -> Self {
        Self { property, value }
    }

    pub fn property_name(&self) -> &str {
        self.property.name()
    }
}

impl fmt::Debug for InvalidValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidValueError")
            .field("model", &self.property.model_name())
            .field("property", &self.property.name())
            .field("value", &self.value)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum MapperError {
    // ========================================
    // Declaration errors
    // ========================================
    #[error("Unknown property type '{0}'")]
    UnknownType(String),

    #[error("Property type '{0}' already declared")]
    DuplicateType(String),

    #[error("Property type '{0}' is abstract and cannot be instantiated")]
    AbstractType(String),

    #[error("Option '{option}' is not accepted by property type '{type_name}'")]
    UnsupportedOption { type_name: String, option: String },

    #[error("Invalid value for option '{option}': {reason}")]
    InvalidOptionValue { option: String, reason: String },

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Property '{property}' has precision {precision} lower than scale {scale}")]
    PrecisionLessThanScale {
        property: String,
        precision: usize,
        scale: usize,
    },

    #[error("Property '{1}' already declared on model '{0}'")]
    DuplicateProperty(String, String),

    #[error("Model '{0}' declares no key")]
    MissingKey(String),

    #[error("Model '{0}' already declared")]
    DuplicateModel(String),

    #[error("Model '{0}' not found")]
    UnknownModel(String),

    #[error("Property '{1}' not found on model '{0}'")]
    UnknownProperty(String, String),

    #[error("Relationship '{1}' not found on model '{0}'")]
    UnknownRelationship(String, String),

    #[error("Model '{model}' has a key of {expected} values, got {actual}")]
    KeyArity {
        model: String,
        expected: usize,
        actual: usize,
    },

    // ========================================
    // Lifecycle errors
    // ========================================
    #[error(transparent)]
    InvalidValue(#[from] InvalidValueError),

    #[error("Immutable resource of model '{model}' cannot {operation}")]
    Immutable { model: String, operation: String },

    #[error("Deleted resource of model '{0}' cannot be modified")]
    ImmutableDeleted(String),

    #[error("Accessor '{1}' on model '{0}' is not public")]
    PrivateAccessor(String, String),

    #[error("Resource belongs to repository '{expected}', not '{actual}'")]
    RepositoryMismatch { expected: String, actual: String },

    #[error("Relationship '{relationship}' expects a '{expected}', got a '{actual}'")]
    WrongTarget {
        relationship: String,
        expected: String,
        actual: String,
    },

    #[error("Key {key} of model '{model}' is already mapped to another resource")]
    DuplicateIdentity { model: String, key: String },

    #[error("Store rejected {operation} of model '{model}'")]
    StoreRejected { operation: String, model: String },

    // ========================================
    // Collaborator errors
    // ========================================
    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    pub fn immutable(model: &str, operation: &str) -> Self {
        Self::Immutable {
            model: model.to_string(),
            operation: operation.to_string(),
        }
    }

    /// The descriptor that failed validation, if this is a validation error.
    pub fn invalid_property(&self) -> Option<&Rc<Property>> {
        match self {
            Self::InvalidValue(err) => Some(&err.property),
            _ => None,
        }
    }
}
