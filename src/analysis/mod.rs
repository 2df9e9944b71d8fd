pub mod normalize;
pub mod stem;
pub mod stopword;
pub mod transliterate;
