mod control_flow_flattening;
mod equivalence;
