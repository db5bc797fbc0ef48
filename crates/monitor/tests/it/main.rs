#![allow(missing_docs)]

mod monitor;

const fn main() {}
