pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod network;

pub(crate) mod node;

pub(crate) mod recording_app;

pub(crate) mod scheme;

pub(crate) mod simulation;
