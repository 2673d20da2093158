pub mod dto;
pub mod rate_limiter;
pub mod routes;
