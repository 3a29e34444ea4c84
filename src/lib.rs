pub mod admission;
pub mod error;
pub mod fanout;
pub mod limiter;
pub mod room;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils {
    pub mod token;
}
