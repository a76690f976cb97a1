pub mod block;
pub mod view;

pub use block::{Block, BlockHeader};
pub use view::{Preprepare, Subject, View};
