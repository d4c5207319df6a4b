pub mod params;
pub mod random;
pub mod shape;
pub mod tree;

pub use params::{ConfigError, HandleType, ParameterError, Parameters, PRESETS};
pub use random::{RandomSnapshot, RandomStream};
pub use shape::{EnvelopeShape, Shape, SplitError};
pub use tree::{
	leaf::{LeafMesh, LeafShape},
	prune::EnvelopeProfile,
	stem::{AttachmentId, ControlPoint, HandleKind},
	StemRecord, Tree, TreeGrower,
};

// Growth pipeline, one branching level at a time:
// - TreeGrower seeds the trunk, or one stem per attachment point of the previous level
// - PruningEnvelope grows each stem (and its splits) with StemGrower, shrinking it to fit
// - ChildPointSampler harvests attachment points from the finished stems
// - LeafPlacer turns the last level's attachment points into leaves
