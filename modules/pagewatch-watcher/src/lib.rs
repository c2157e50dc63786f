pub mod budget;
pub mod classifier;
pub mod differ;
pub mod governor;
pub mod normalize;
pub mod pipeline;
pub mod salvage;
pub mod store;
pub mod traits;

#[cfg(test)]
pub mod testing;
