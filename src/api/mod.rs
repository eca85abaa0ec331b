pub mod middleware;
pub mod models;
pub mod proxy;
pub mod routes;

use actix_web::web;

use middleware::Cors;

/// Mounts everything under `/api` behind the CORS allow-list.
pub fn configure(cfg: &mut web::ServiceConfig, allowed_origins: &[String]) {
    cfg.service(
        web::scope("/api")
            .wrap(Cors::new(allowed_origins.to_vec()))
            .configure(proxy::configure)
            .configure(routes::configure),
    );
}
