use std::fmt;

/// The main types of DISCON errors
#[derive(Debug)]
pub enum DisconError<T: fmt::Debug> {
    /// A component specific error
    Component(T),
    /// The error status reported by the controller model
    Model(String),
    IO(Box<dyn std::error::Error>),
}

impl<T: fmt::Debug> From<std::io::Error> for DisconError<T> {
    fn from(e: std::io::Error) -> DisconError<T> {
        DisconError::IO(Box::new(e))
    }
}

impl<T: fmt::Debug> From<serde_pickle::Error> for DisconError<T> {
    fn from(e: serde_pickle::Error) -> DisconError<T> {
        DisconError::IO(Box::new(e))
    }
}

impl<T: fmt::Debug + fmt::Display> fmt::Display for DisconError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use DisconError::*;
        match self {
            Component(component) => write!(f, "{}", component),
            Model(status) => write!(f, "ErrorStatus set: \"{}\"", status),
            IO(error) => write!(f, "{}", error),
        }
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for DisconError<T> {}

impl<T: fmt::Debug> DisconError<T> {
    /// Wraps the component error into another component error type
    pub fn wrap<U: fmt::Debug>(self, component: impl FnOnce(T) -> U) -> DisconError<U> {
        match self {
            DisconError::Component(c) => DisconError::Component(component(c)),
            DisconError::Model(status) => DisconError::Model(status),
            DisconError::IO(e) => DisconError::IO(e),
        }
    }
}

/// Implements the conversions of component errors into a parent component error
macro_rules! component_from {
    ($parent:ident : $($child:ident => $variant:ident),+) => {
        $(impl From<$crate::error::DisconError<$child>> for $crate::error::DisconError<$parent> {
            fn from(e: $crate::error::DisconError<$child>) -> Self {
                e.wrap($parent::$variant)
            }
        })+
    };
}
