//! Shared test catalog.

use std::sync::Arc;

use kin_meta::{
    Cardinality, Catalog, FieldDescriptor, IdGeneration, IdentityDescriptor, IdentityShape,
    InheritanceStrategy, RelationshipDescriptor, TypeDescriptor,
};

pub(crate) fn catalog() -> Arc<Catalog> {
    let catalog = Catalog::builder()
        .register(
            TypeDescriptor::new("Book")
                .field(FieldDescriptor::scalar("title"))
                .field(FieldDescriptor::relation(
                    "chapters",
                    RelationshipDescriptor::owned("Chapter", Cardinality::OneToManyList),
                ))
                .field(FieldDescriptor::relation(
                    "cover",
                    RelationshipDescriptor::owned("Cover", Cardinality::OneToOne),
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
        .register(TypeDescriptor::new("Cover").field(FieldDescriptor::scalar("color")))
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
        .register(
            TypeDescriptor::new("Zoo")
                .field(FieldDescriptor::relation(
                    "animals",
                    RelationshipDescriptor::owned("Animal", Cardinality::OneToManyUnordered),
                ))
                .field(FieldDescriptor::relation(
                    "pets",
                    RelationshipDescriptor::unowned("Animal", Cardinality::OneToManyUnordered)
                        .polymorphic(),
                )),
        )
        .register(TypeDescriptor::new("Animal").with_inheritance(InheritanceStrategy::KindPerClass))
        .register(TypeDescriptor::new("Dog").extends("Animal"))
        .register(TypeDescriptor::new("Folder").field(FieldDescriptor::relation(
            "children",
            RelationshipDescriptor::owned("Folder", Cardinality::OneToManyUnordered),
        )))
        .register(
            TypeDescriptor::new("Tag")
                .with_identity(IdentityDescriptor::new(IdentityShape::RawName, IdGeneration::Explicit)),
        )
        .register(
            TypeDescriptor::new("Ticket")
                .with_identity(IdentityDescriptor::new(IdentityShape::Key, IdGeneration::Store)),
        )
        .build();
    match catalog {
        Ok(c) => Arc::new(c),
        Err(e) => panic!("fixture catalog invalid: {e}"),
    }
}
