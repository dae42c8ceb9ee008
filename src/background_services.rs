pub mod position_simulator;
