#![allow(dead_code)]

#[macro_use]
extern crate lazy_static;

use std::env;

pub mod analysis;
pub mod ast;
pub mod compile;
pub mod errors;
pub mod helper;
pub mod lex;
pub mod parse;
pub mod parse_expr;
pub mod parse_helper;
pub mod tast;
pub mod types;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let sliced: Vec<&str> = args.iter().map(|s| &s[..]).collect();
    let sliced: &[&str] = &sliced[1..];

    compile::launch(sliced);
}
