// HTTP-backed engine adapters

pub mod http;
pub mod libretranslate;
pub mod recognizer;

pub use http::HttpTransport;
pub use libretranslate::LibreTranslate;
pub use recognizer::RemoteRecognizer;
