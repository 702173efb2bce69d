//! Catalog and engine builders shared by the engine tests.

use std::sync::Arc;

use kin_batch::WriteCounter;
use kin_meta::{
    Cardinality, Catalog, FieldDescriptor, IdGeneration, IdentityDescriptor, IdentityShape,
    RelationshipDescriptor, TypeDescriptor,
};
use kin_store::InMemoryDatastore;

use crate::config::EngineConfig;
use crate::engine::Engine;

pub(crate) fn library() -> Arc<Catalog> {
    let catalog = Catalog::builder()
        .register(
            TypeDescriptor::new("Book")
                .field(FieldDescriptor::scalar("title"))
                .field(FieldDescriptor::relation(
                    "chapters",
                    RelationshipDescriptor::owned("Chapter", Cardinality::OneToManyList),
                ))
                .field(FieldDescriptor::relation(
                    "authors",
                    RelationshipDescriptor::unowned("Author", Cardinality::OneToManyUnordered)
                        .bidirectional("book"),
                )),
        )
        .register(
            TypeDescriptor::new("Chapter")
                .field(FieldDescriptor::scalar("title"))
                .field(FieldDescriptor::relation(
                    "paragraphs",
                    RelationshipDescriptor::owned("Paragraph", Cardinality::OneToManyUnordered),
                )),
        )
        .register(TypeDescriptor::new("Paragraph").field(FieldDescriptor::unindexed("text")))
        .register(
            TypeDescriptor::new("Author")
                .with_identity(IdentityDescriptor::new(IdentityShape::Numeric, IdGeneration::Sequence))
                .field(FieldDescriptor::scalar("name")),
        )
        .register(
            TypeDescriptor::new("Canvas").field(FieldDescriptor::relation(
                "shapes",
                RelationshipDescriptor::owned("Shape", Cardinality::OneToManyList).polymorphic(),
            )),
        )
        .register(TypeDescriptor::new("Shape").field(FieldDescriptor::scalar("color")))
        .register(
            TypeDescriptor::new("Circle")
                .extends("Shape")
                .with_discriminator("circle")
                .field(FieldDescriptor::scalar("radius")),
        )
        .register(TypeDescriptor::new("Square").extends("Shape"))
        .build();
    match catalog {
        Ok(c) => Arc::new(c),
        Err(e) => panic!("library catalog invalid: {e}"),
    }
}

pub(crate) struct Setup {
    pub store: Arc<InMemoryDatastore>,
    pub writes: Arc<WriteCounter>,
    pub engine: Engine,
}

pub(crate) fn setup() -> Setup {
    setup_with(EngineConfig::default())
}

pub(crate) fn setup_with(config: EngineConfig) -> Setup {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(InMemoryDatastore::new());
    let writes = Arc::new(WriteCounter::new());
    let engine = Engine::new(store.clone(), library(), config).with_observer(writes.clone());
    Setup { store, writes, engine }
}
