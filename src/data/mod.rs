/// Data layer: streak images, derived tables and the memoized pipeline.
///
/// Architecture:
/// ```text
///        .img
///          │
///          ▼
///   ┌───────────┐
///   │  loader   │  parse bytes → Measurement
///   └───────────┘
///          │
///          ▼
///   ┌───────────┐
///   │  builder  │  aggregate (filter) → smooth (signal) → fit → normalize
///   └───────────┘
///          │
///          ▼
///   ┌─────────────┐
///   │ DerivedTable│  rows + optional FitResult
///   └─────────────┘
///
///  pipeline = loader + builder behind one LRU cache (cache) per operation
/// ```

pub mod builder;
pub mod cache;
pub mod filter;
pub mod fit;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod signal;
