pub mod simulated_adaptor;
