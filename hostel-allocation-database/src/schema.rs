// Kept in sync with migrations/2024-09-01-000000_create_hostel/up.sql

diesel::table! {
    profiles (id) {
        id -> Int4,
        #[max_length = 255]
        username -> Varchar,
        #[max_length = 255]
        full_name -> Varchar,
        #[max_length = 255]
        email -> Nullable<Varchar>,
        #[max_length = 255]
        contact_info -> Nullable<Varchar>,
        #[max_length = 255]
        course -> Nullable<Varchar>,
        role -> Text,
        deleted -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    beds (id) {
        id -> Int4,
        #[max_length = 64]
        room_number -> Varchar,
        #[max_length = 64]
        bed_identifier -> Varchar,
        is_occupied -> Bool,
        allocated_to -> Nullable<Int4>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    bed_change_requests (id) {
        id -> Int4,
        student_id -> Int4,
        current_bed_id -> Nullable<Int4>,
        requested_bed_id -> Nullable<Int4>,
        status -> Text,
        reason -> Text,
        admin_notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(beds -> profiles (allocated_to));
diesel::joinable!(bed_change_requests -> profiles (student_id));

diesel::allow_tables_to_appear_in_same_query!(bed_change_requests, beds, profiles);
