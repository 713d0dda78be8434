pub mod convergence_proptest;
