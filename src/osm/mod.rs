mod extract;

pub use extract::extract_platforms;
