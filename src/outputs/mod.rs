//! Local run artifacts written to the output directory.
//!
//! # Submodules
//!
//! - [`json`]: the run's articles as `result.json`
//! - [`diagnostics`]: the run's failures as `exceptions.txt`, only when there are any
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── result.json      # every ResolvedArticle of the run
//! └── exceptions.txt   # one block per recorded failure
//! ```

pub mod diagnostics;
pub mod json;
