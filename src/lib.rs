pub mod core {
    pub mod cli;
    pub mod config;
    pub mod error;
    pub mod state;
    pub mod tracing_init;
}

pub mod api {
    pub mod client;
}

pub mod models {
    pub mod attendance;
    pub mod response;
    pub mod schedule;
    pub mod user;
}

pub mod stores {
    pub mod token_store;
}

pub mod validation {
    pub mod credentials;
    pub mod qr;
}

pub mod coordination {
    pub mod debouncer;
    pub mod request_coordinator;
}

pub mod session {
    pub mod auth;
    pub mod history;
    pub mod scan;
    pub mod today;

    #[cfg(test)]
    pub(crate) mod test_support;
}

pub mod utils {
    pub mod time;
}
