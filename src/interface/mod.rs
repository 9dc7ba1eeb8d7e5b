//! 사용자 접점(터미널/명령행) 계층.

pub mod cli;
