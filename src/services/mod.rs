pub(crate) mod detection;
pub(crate) mod evaluation;
pub(crate) mod statistics;
pub(crate) mod storage;
