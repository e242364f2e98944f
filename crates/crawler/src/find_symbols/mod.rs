//
// find_symbols/mod.rs
//
// Reference search over the semantic model, with cascading along
// override and implementation relationships
//

pub mod cascade;
pub mod engine;
pub mod finders;
pub mod progress;
pub mod search;
pub mod symbols;

pub use cascade::{cascade_symbols, CascadeDirection, FindReferencesSearchOptions};
pub use engine::{DocumentSpan, FindReferencesSearchEngine, SearchScope};
pub use finders::{default_finders, DeclarationFinder, NameReferenceFinder, ReferenceFinder, ReferenceLocation};
pub use progress::{CollectingProgress, FindReferencesProgress, NoOpProgress, SearchCompletion};
pub use search::{SerializableSymbol, SymbolFinder};
pub use symbols::{SymbolGraph, SymbolInfo, SymbolKind, SymbolSource, TextSpan};
