pub mod iron_condor;
