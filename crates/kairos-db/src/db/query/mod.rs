//! Boxed query builders, one module per table family.

pub mod group;
pub mod occurrence;
pub mod participation;
pub mod subscription;
pub mod template;

#[cfg(test)]
mod tests;
