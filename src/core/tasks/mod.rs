pub mod handle;

pub use handle::{
    CancellableTask,
    TaskHandle,
};
