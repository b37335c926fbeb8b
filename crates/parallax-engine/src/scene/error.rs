/// Errors raised while building or restoring scene content.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("geometry `{uuid}` is invalid: {reason}")]
    InvalidGeometry { uuid: String, reason: String },

    #[error("instance {buffer} buffer holds {actual} floats, expected {expected}")]
    InstanceBufferLength {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("instance count {count} exceeds the limit of {max}")]
    TooManyInstances { count: usize, max: usize },

    #[error("unresolved geometry reference `{0}`")]
    UnknownGeometry(String),

    #[error("unresolved material reference `{0}`")]
    UnknownMaterial(String),

    #[error("node `{0}` is a mesh without geometry or material")]
    IncompleteMesh(String),

    #[error("node `{0}` is instanced but carries no instance count")]
    MissingInstanceCount(String),

    #[error("transform matrix contains non-finite values")]
    NonFiniteMatrix,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}
