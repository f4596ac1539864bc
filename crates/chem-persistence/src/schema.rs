//! Esquema Diesel (escrito a mano, equivalente a `diesel print-schema`).

diesel::table! {
    substances (id) {
        id -> BigInt,
        name -> Text,
        formula -> Text,
        molweight -> Double,
        monomass -> Double,
        casrn -> Nullable<Text>,
        graphdb -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    identifiers (id) {
        id -> BigInt,
        substance_id -> BigInt,
        kind -> Text,
        value -> Text,
        source -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    descriptors (id) {
        id -> BigInt,
        substance_id -> BigInt,
        kind -> Text,
        value -> Text,
        source -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sources (id) {
        id -> BigInt,
        substance_id -> BigInt,
        source -> Text,
        result -> SmallInt,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    templates (category) {
        category -> Text,
        skeleton -> Jsonb,
        updated -> Timestamptz,
    }
}

diesel::table! {
    metadata (id) {
        id -> BigInt,
        category -> Text,
        position -> Integer,
        label -> Text,
        section -> Text,
        subsection -> Text,
        datatype -> Text,
        output -> Nullable<Text>,
        grp -> Nullable<Text>,
    }
}

diesel::joinable!(identifiers -> substances (substance_id));
diesel::joinable!(descriptors -> substances (substance_id));
diesel::joinable!(sources -> substances (substance_id));
diesel::joinable!(metadata -> templates (category));

diesel::allow_tables_to_appear_in_same_query!(substances, identifiers, descriptors, sources, templates, metadata);
