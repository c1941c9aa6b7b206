pub mod bar;
pub mod contract;
pub mod duration;
pub mod request_params;
pub mod series;
pub mod timeframe;
