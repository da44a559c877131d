pub mod opensea;
