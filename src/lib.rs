pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod csrf;
    pub mod keys;
}

pub mod models {
    pub mod session;
}

pub mod repositories {
    pub mod session;
}

pub mod services {
    pub mod client_ip;
    pub mod rate_limit;
    pub mod session;
    pub mod upstream;
}

pub mod handlers {
    pub mod auth;
    pub mod proxy;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
}

pub mod validation {
    pub mod session;
}
