// Tenant identity resolution for the automation API

pub mod middleware;

pub use middleware::TenantContext;
