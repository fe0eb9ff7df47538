mod experiment;
mod flowmon;
mod queues;
mod routing_table;
mod tcp_rto;
mod topologies;
