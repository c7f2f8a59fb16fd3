use std::error::Error;
use std::fmt::{Display, Formatter};

/// Separator between the ids of nested blocks in a block path.
pub const PATH_SEPARATOR: char = '.';

/// The category of a resolution error. See [`ResolveError::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An input reference does not resolve to a block or input in scope.
    Reference,
    /// The block graph of a scope contains a cycle.
    Cycle,
    /// A block's type has no registered propagator.
    UnknownType,
    /// A block received a number of inputs outside the accepted range.
    Arity,
    /// Shapes that must agree do not.
    ShapeMismatch,
    /// Invalid arithmetic on dimensions.
    Dimension,
    /// A dimension, shape or configuration value is invalid.
    Validation,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reference => "ReferenceError",
            Self::Cycle => "CycleError",
            Self::UnknownType => "UnknownTypeError",
            Self::Arity => "ArityError",
            Self::ShapeMismatch => "ShapeMismatchError",
            Self::Dimension => "DimensionError",
            Self::Validation => "ValidationError",
        }
    }

    /// Return true for errors which are detected before any propagation in
    /// a scope starts, and which abort the whole scope.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Reference | Self::Cycle | Self::UnknownType)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error that occurred while resolving the shapes of an architecture.
///
/// Errors are attached to a block path. A path has one entry for a block in
/// the top-level architecture. When an error occurs inside a group, the path
/// is prefixed with the ids of the enclosing group blocks, so an error in
/// block `b1` of group `g1` has the path `g1.b1`. Errors which relate to a
/// scope as a whole (eg. a declared output) use the id of the port instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolveError {
    path: Vec<String>,
    kind: ErrorKind,
    message: String,
}

impl ResolveError {
    pub(crate) fn new(id: &str, kind: ErrorKind, message: impl Into<String>) -> ResolveError {
        ResolveError {
            path: vec![id.to_string()],
            kind,
            message: message.into(),
        }
    }

    /// Return the general category of error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return the error message, without the block path.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Ids of the blocks this error relates to, outermost first.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Return the namespaced id of the block this error relates to, eg.
    /// `g1.b1`.
    pub fn block_path(&self) -> String {
        let sep = PATH_SEPARATOR.to_string();
        self.path.join(&sep)
    }

    /// Prefix the path of this error with the id of an enclosing block.
    pub(crate) fn in_block(mut self, id: &str) -> ResolveError {
        self.path.insert(0, id.to_string());
        self
    }
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block \"{}\": {}: {}",
            self.block_path(),
            self.kind,
            self.message
        )
    }
}

impl Error for ResolveError {}

/// List of errors returned when resolution of an architecture fails.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolveErrors(pub Vec<ResolveError>);

impl ResolveErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ResolveError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the first error for the block with a given namespaced id.
    pub fn find(&self, block_path: &str) -> Option<&ResolveError> {
        self.0.iter().find(|err| err.block_path() == block_path)
    }
}

impl Display for ResolveErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "architecture has {} error(s)", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}

impl Error for ResolveErrors {}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ResolveError, ResolveErrors};

    #[test]
    fn test_nested_path() {
        let err = ResolveError::new("b1", ErrorKind::ShapeMismatch, "shapes differ")
            .in_block("g1")
            .in_block("outer");
        assert_eq!(err.block_path(), "outer.g1.b1");
        assert_eq!(err.path(), ["outer", "g1", "b1"]);
        assert_eq!(
            err.to_string(),
            "block \"outer.g1.b1\": ShapeMismatchError: shapes differ"
        );
    }

    #[test]
    fn test_find() {
        let errors = ResolveErrors(vec![
            ResolveError::new("a", ErrorKind::Dimension, "bad"),
            ResolveError::new("b", ErrorKind::Arity, "bad").in_block("g"),
        ]);
        assert_eq!(errors.find("g.b").map(|e| e.kind()), Some(ErrorKind::Arity));
        assert!(errors.find("b").is_none());
        assert!(ErrorKind::Cycle.is_structural());
        assert!(!ErrorKind::Dimension.is_structural());
    }
}
