// Вспомогательные модули

pub mod b64;
pub mod logging;
