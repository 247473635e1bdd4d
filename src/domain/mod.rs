// Domain-specific error types
pub mod errors;

// Frames, labels and normalization
pub mod ml;

// Port interfaces
pub mod ports;
