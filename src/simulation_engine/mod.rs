// simulation_engine/mod.rs
pub mod intersections;
pub mod network;
pub mod simulation;
pub mod vehicle_generator;
pub mod vehicles;
