pub mod chars;
pub mod editop;
pub mod front;
pub mod fronttrace;
pub mod polish;
pub mod provider;
pub mod script;
pub mod seqview;
pub mod tracepoints;
