/// Architecture-specific code, gated by target

pub mod x86_64;
