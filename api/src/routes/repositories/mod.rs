pub mod repository_request;
pub mod repository_routes;
