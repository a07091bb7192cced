//! imgstream CLI - command definitions shared with the binary.

pub mod commands;
