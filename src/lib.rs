pub mod codegen;
pub mod error;
pub mod parse;
pub mod schema;
pub mod secrets;
pub mod validate;
pub mod wasm;

#[cfg(not(target_arch = "wasm32"))]
pub mod logs;
#[cfg(not(target_arch = "wasm32"))]
pub mod service;
#[cfg(not(target_arch = "wasm32"))]
pub mod simulation;
