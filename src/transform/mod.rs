pub mod crop;
pub mod normalize;
pub mod slice;

pub use crop::*;
pub use normalize::*;
pub use slice::*;

pub trait Transform<T> {
    fn apply(&self, target: &T) -> T;
}
