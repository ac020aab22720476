#![doc = r"Test harness for scopekit component trees."]

mod testing;

pub use testing::*;
