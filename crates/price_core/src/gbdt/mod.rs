//! Fixed-point gradient-boosted trees
//!
//! Features and targets are standardized first and then quantized to
//! integers at [`SCALE`]. Scoring is integer-only, so a saved ensemble gives
//! bit-identical predictions on every platform.
//!
//! ```rust
//! use realty_price_core::gbdt::{Model, Node, Tree, SCALE};
//!
//! let tree = Tree::new(
//!     vec![
//!         Node::internal(0, 0, 0, 1, 2),
//!         Node::leaf(1, -SCALE),
//!         Node::leaf(2, SCALE),
//!     ],
//!     SCALE / 10,
//! );
//! let model = Model::new(vec![tree], 0, 1);
//! assert_eq!(model.predict(&[0.5]).unwrap(), 0.1);
//! ```

pub mod model;
pub mod tree;

pub use model::{from_fixed, to_fixed, Model, FORMAT_VERSION, SCALE};
pub use tree::{Node, Tree};
