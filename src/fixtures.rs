//! Introspection fixtures shared by unit and integration tests.
//!
//! Builders mirror the shape of a standard `__schema` introspection
//! response, so fixtures decode through the same path as live schemas.

use serde_json::{json, Value};

pub fn named(kind: &str, name: &str) -> Value {
    json!({ "kind": kind, "name": name, "ofType": null })
}

pub fn list(inner: Value) -> Value {
    json!({ "kind": "LIST", "name": null, "ofType": inner })
}

pub fn non_null(inner: Value) -> Value {
    json!({ "kind": "NON_NULL", "name": null, "ofType": inner })
}

pub fn scalar(name: &str) -> Value {
    named("SCALAR", name)
}

pub fn field(name: &str, ty: Value) -> Value {
    json!({ "name": name, "description": null, "args": [], "type": ty })
}

pub fn field_with_args(name: &str, ty: Value, args: Vec<Value>) -> Value {
    json!({ "name": name, "description": null, "args": args, "type": ty })
}

pub fn input(name: &str, ty: Value) -> Value {
    json!({ "name": name, "description": null, "type": ty, "defaultValue": null })
}

pub fn object(name: &str, interfaces: &[&str], fields: Vec<Value>) -> Value {
    let ifaces: Vec<Value> = interfaces.iter().map(|i| named("INTERFACE", i)).collect();
    json!({
        "kind": "OBJECT", "name": name, "description": null,
        "fields": fields, "inputFields": null, "interfaces": ifaces,
        "enumValues": null, "possibleTypes": null
    })
}

pub fn interface(name: &str, fields: Vec<Value>, possible: &[&str]) -> Value {
    let possible: Vec<Value> = possible.iter().map(|p| named("OBJECT", p)).collect();
    json!({
        "kind": "INTERFACE", "name": name, "description": null,
        "fields": fields, "inputFields": null, "interfaces": [],
        "enumValues": null, "possibleTypes": possible
    })
}

pub fn input_object(name: &str, fields: Vec<Value>) -> Value {
    json!({
        "kind": "INPUT_OBJECT", "name": name, "description": null,
        "fields": null, "inputFields": fields, "interfaces": null,
        "enumValues": null, "possibleTypes": null
    })
}

pub fn scalar_type(name: &str) -> Value {
    json!({
        "kind": "SCALAR", "name": name, "description": null,
        "fields": null, "inputFields": null, "interfaces": null,
        "enumValues": null, "possibleTypes": null
    })
}

/// Wrap `types` in an introspection response rooted at `Query`.
pub fn introspection(types: Vec<Value>) -> Value {
    json!({
        "data": { "__schema": {
            "queryType": { "name": "Query" },
            "mutationType": null,
            "subscriptionType": null,
            "types": types
        }}
    })
}

fn string_filter() -> Value {
    input_object(
        "StringFilterInput",
        vec![
            input("eq", scalar("String")),
            input("in", list(scalar("String"))),
            input("match", scalar("String")),
            input("contains", scalar("String")),
        ],
    )
}

fn int_filter() -> Value {
    input_object(
        "IntFilterInput",
        vec![
            input("eq", scalar("Int")),
            input("in", list(scalar("Int"))),
            input("gt", scalar("Int")),
        ],
    )
}

/// A CMS-like schema with `_Content` as content root.
///
/// Content types: `ArticlePage { Title, Body, Author, Hero }`,
/// `BlogPost { Heading, Teaser }`, `HeroBlock { Heading }`,
/// `StandardPage { MainBody }`.
pub fn cms_schema() -> Value {
    cms_schema_with_where(default_where_fields())
}

pub fn default_where_fields() -> Vec<Value> {
    vec![
        input("_metadata", named("INPUT_OBJECT", "IContentMetadataWhereInput")),
        input("_fulltext", named("INPUT_OBJECT", "StringFilterInput")),
        input("ContentLink", named("INPUT_OBJECT", "ContentLinkWhereInput")),
        input("Category", named("INPUT_OBJECT", "StringFilterInput")),
        input("Priority", named("INPUT_OBJECT", "IntFilterInput")),
        input("_and", list(named("INPUT_OBJECT", "_ContentWhereInput"))),
        input("_or", list(named("INPUT_OBJECT", "_ContentWhereInput"))),
        input("_not", list(named("INPUT_OBJECT", "_ContentWhereInput"))),
    ]
}

pub fn cms_schema_with_where(where_fields: Vec<Value>) -> Value {
    let content_args = vec![
        input("where", named("INPUT_OBJECT", "_ContentWhereInput")),
        input("limit", scalar("Int")),
        input("skip", scalar("Int")),
        input("locale", list(named("ENUM", "Locales"))),
    ];
    let metadata_fields = vec![
        field("key", scalar("String")),
        field("displayName", scalar("String")),
        field("locale", scalar("String")),
        field("types", list(scalar("String"))),
        field("url", named("OBJECT", "ContentUrl")),
    ];
    let content_fields = vec![field("_metadata", named("INTERFACE", "IContentMetadata"))];

    introspection(vec![
        object("Query", &[], vec![
            field_with_args("_Content", named("OBJECT", "_ContentOutput"), content_args),
            field_with_args("ArticlePage", named("OBJECT", "ArticlePageOutput"), vec![]),
        ]),
        object("_ContentOutput", &[], vec![
            field("items", list(named("INTERFACE", "_IContent"))),
            field("total", scalar("Int")),
            field("facets", named("OBJECT", "_ContentFacet")),
        ]),
        object("ArticlePageOutput", &[], vec![
            field("items", list(named("OBJECT", "ArticlePage"))),
        ]),
        object("_ContentFacet", &[], vec![]),
        interface("_IContent", content_fields,
            &["ArticlePage", "BlogPost", "HeroBlock", "StandardPage"]),
        interface("IContentMetadata", metadata_fields.clone(), &["ContentMetadata"]),
        object("ContentMetadata", &["IContentMetadata"], metadata_fields),
        object("ContentUrl", &[], vec![
            field("default", scalar("String")),
            field("hierarchical", scalar("String")),
        ]),
        object("ArticlePage", &["_IContent"], vec![
            field("_metadata", named("INTERFACE", "IContentMetadata")),
            field("_id", scalar("String")),
            field("Title", scalar("String")),
            field("Body", scalar("String")),
            field("Author", named("OBJECT", "Person")),
            field("Hero", named("OBJECT", "HeroBlock")),
            field("Priority", scalar("Int")),
            field("Tags", list(scalar("String"))),
        ]),
        object("BlogPost", &["_IContent"], vec![
            field("_metadata", named("INTERFACE", "IContentMetadata")),
            field("Heading", scalar("String")),
            field("Teaser", scalar("String")),
        ]),
        object("HeroBlock", &["_IContent"], vec![
            field("_metadata", named("INTERFACE", "IContentMetadata")),
            field("Heading", scalar("String")),
        ]),
        object("StandardPage", &["_IContent"], vec![
            field("_metadata", named("INTERFACE", "IContentMetadata")),
            field("MainBody", scalar("String")),
        ]),
        object("Person", &[], vec![
            field("Name", scalar("String")),
            field("Email", scalar("String")),
            field("Address", named("OBJECT", "Address")),
        ]),
        object("Address", &[], vec![field("City", scalar("String"))]),
        input_object("_ContentWhereInput", where_fields),
        input_object("IContentMetadataWhereInput", vec![
            input("key", named("INPUT_OBJECT", "StringFilterInput")),
            input("displayName", named("INPUT_OBJECT", "StringFilterInput")),
            input("types", named("INPUT_OBJECT", "StringFilterInput")),
            input("locale", named("INPUT_OBJECT", "StringFilterInput")),
            input("url", named("INPUT_OBJECT", "ContentUrlWhereInput")),
        ]),
        input_object("ContentUrlWhereInput", vec![
            input("default", named("INPUT_OBJECT", "StringFilterInput")),
            input("hierarchical", named("INPUT_OBJECT", "StringFilterInput")),
        ]),
        input_object("ContentLinkWhereInput", vec![
            input("Id", named("INPUT_OBJECT", "IntFilterInput")),
            input("GuidValue", named("INPUT_OBJECT", "StringFilterInput")),
        ]),
        string_filter(),
        int_filter(),
        scalar_type("String"),
        scalar_type("Int"),
        json!({
            "kind": "ENUM", "name": "Locales", "description": null,
            "fields": null, "inputFields": null, "interfaces": null,
            "enumValues": [{ "name": "en" }, { "name": "sv" }],
            "possibleTypes": null
        }),
        object("__Schema", &[], vec![field("description", scalar("String"))]),
    ])
}

/// A schema whose query root has no content collection.
pub fn schema_without_content_root() -> Value {
    introspection(vec![
        object("Query", &[], vec![
            field("ping", scalar("String")),
            field("settings", named("OBJECT", "Settings")),
        ]),
        object("Settings", &[], vec![field("siteName", scalar("String"))]),
        object("ArticlePage", &["_IContent"], vec![
            field("_metadata", named("OBJECT", "ContentMetadata")),
            field("Title", scalar("String")),
        ]),
        object("ContentMetadata", &[], vec![field("key", scalar("String"))]),
        interface("_IContent", vec![], &["ArticlePage"]),
        scalar_type("String"),
    ])
}

/// A where input with full-text search but no way to filter by type.
pub fn schema_without_type_filter() -> Value {
    cms_schema_with_where(vec![
        input("_fulltext", named("INPUT_OBJECT", "StringFilterInput")),
        input("_and", list(named("INPUT_OBJECT", "_ContentWhereInput"))),
    ])
}

/// `ArticlePage { Title, Body }` and nothing else.
pub fn article_only_schema() -> Value {
    introspection(vec![
        object("Query", &[], vec![field("ArticlePage", named("OBJECT", "ArticlePageOutput"))]),
        object("ArticlePageOutput", &[], vec![field("items", list(named("OBJECT", "ArticlePage")))]),
        interface("_IContent", vec![], &["ArticlePage"]),
        object("ArticlePage", &["_IContent"], vec![
            field("Title", scalar("String")),
            field("Body", scalar("String")),
        ]),
        scalar_type("String"),
    ])
}

/// A content type `TreePage` whose `Node` children point back at `Node`.
pub fn recursive_schema() -> Value {
    let content_args = vec![
        input("limit", scalar("Int")),
        input("skip", scalar("Int")),
    ];
    introspection(vec![
        object("Query", &[], vec![
            field_with_args("_Content", named("OBJECT", "_ContentOutput"), content_args),
        ]),
        object("_ContentOutput", &[], vec![
            field("items", list(named("INTERFACE", "_IContent"))),
            field("total", scalar("Int")),
        ]),
        interface("_IContent", vec![], &["TreePage"]),
        object("TreePage", &["_IContent"], vec![
            field("Name", scalar("String")),
            field("Root", named("OBJECT", "Node")),
        ]),
        object("Node", &[], vec![
            field("Name", scalar("String")),
            field("A", named("OBJECT", "Node")),
            field("B", named("OBJECT", "Node")),
            field("Page", named("OBJECT", "TreePage")),
        ]),
        scalar_type("String"),
        scalar_type("Int"),
    ])
}
