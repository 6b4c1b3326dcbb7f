pub mod history;
pub mod pipeline;
pub mod scripts;
pub mod storage;
pub mod translator;
