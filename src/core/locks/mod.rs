pub mod condvar;
pub mod mutex;
pub mod scoped;
pub mod wait;
