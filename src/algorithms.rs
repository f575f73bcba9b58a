pub mod bellman_ford;

pub use bellman_ford::calculate_host_routes;
