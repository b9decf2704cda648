// tlc — Tensor Lowering Compiler
//
// Library root. Bufferization phases live here as modules.

pub mod alloc;
pub mod broadcast;
pub mod bufferize;
pub mod diag;
pub mod id;
pub mod interp;
pub mod ir;
pub mod lexer;
pub mod matmul;
pub mod parser;
pub mod printer;
pub mod shape;
