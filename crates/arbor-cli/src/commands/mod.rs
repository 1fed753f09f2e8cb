pub mod ls;
pub mod version;
pub mod yarn_lock;
