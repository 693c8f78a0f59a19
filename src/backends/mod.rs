/// Built-in decoders.
pub mod decimator;
