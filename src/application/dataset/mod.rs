#[allow(clippy::module_inception)]
pub mod dataset;
pub mod splitter;

pub use dataset::Dataset;
pub use splitter::{DatasetSplit, DatasetSplitter, SplitRatios, WindowPlan, WindowSlices};
