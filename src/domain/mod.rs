pub mod dispatcher;
pub mod models;
pub mod output;
pub mod session;
pub mod settings;
pub mod transport;

#[cfg(test)]
pub mod testing;
