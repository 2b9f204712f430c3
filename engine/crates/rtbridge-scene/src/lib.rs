pub mod acceleration_builder;
pub mod geometry_registry;
pub mod instance_manager;
pub mod scene_manager;

#[cfg(test)]
pub(crate) mod test_backend;
