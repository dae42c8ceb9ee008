pub mod bus;
pub mod coordinate;
pub mod stop;
