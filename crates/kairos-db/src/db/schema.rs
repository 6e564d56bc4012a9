// Kept in sync with migrations/ by hand.

diesel::table! {
    availability_template (id) {
        id -> Uuid,
        publisher_id -> Uuid,
        community_id -> Uuid,
        title -> Text,
        slots -> Jsonb,
        timezone -> Text,
        capacity_min -> Int4,
        capacity_max -> Nullable<Int4>,
        payment_type -> Text,
        payment_amount -> Int8,
        payment_currency -> Text,
        location -> Nullable<Jsonb>,
        closed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    recurrence_group (id) {
        id -> Uuid,
        publisher_id -> Uuid,
        community_id -> Uuid,
        period -> Text,
        days -> Jsonb,
        timezone -> Text,
        active_from -> Nullable<Date>,
        active_until -> Nullable<Date>,
        template_id -> Nullable<Uuid>,
        closed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    occurrence (id) {
        id -> Uuid,
        group_id -> Nullable<Uuid>,
        template_id -> Nullable<Uuid>,
        publisher_id -> Uuid,
        community_id -> Uuid,
        title -> Text,
        labels -> Array<Text>,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        timezone -> Text,
        capacity_min -> Int4,
        capacity_max -> Nullable<Int4>,
        payment_type -> Text,
        payment_amount -> Int8,
        payment_currency -> Text,
        location -> Nullable<Jsonb>,
        closed_at -> Nullable<Timestamptz>,
        propagation_pending -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    subscription (user_id, group_id) {
        user_id -> Uuid,
        group_id -> Uuid,
        days -> Jsonb,
        active_from -> Nullable<Date>,
        active_until -> Nullable<Date>,
        co_registrants -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    participation (occurrence_id, user_id) {
        occurrence_id -> Uuid,
        user_id -> Uuid,
        going -> Text,
        payment_status -> Text,
        roles -> Array<Text>,
        charged_amount -> Int8,
        via_subscription -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    co_registration (occurrence_id, user_id, entity_id) {
        occurrence_id -> Uuid,
        user_id -> Uuid,
        entity_id -> Uuid,
        fee_required -> Bool,
        paid -> Bool,
        auto_join -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    participation_audit (id) {
        id -> Uuid,
        occurrence_id -> Uuid,
        user_id -> Uuid,
        actor_id -> Uuid,
        from_going -> Text,
        to_going -> Text,
        from_payment -> Text,
        to_payment -> Text,
        amount -> Int8,
        currency -> Text,
        recorded_at -> Timestamptz,
    }
}

diesel::joinable!(recurrence_group -> availability_template (template_id));
diesel::joinable!(occurrence -> recurrence_group (group_id));
diesel::joinable!(occurrence -> availability_template (template_id));
diesel::joinable!(subscription -> recurrence_group (group_id));
diesel::joinable!(participation -> occurrence (occurrence_id));
diesel::joinable!(co_registration -> occurrence (occurrence_id));
diesel::joinable!(participation_audit -> occurrence (occurrence_id));

diesel::allow_tables_to_appear_in_same_query!(
    availability_template,
    recurrence_group,
    occurrence,
    subscription,
    participation,
    co_registration,
    participation_audit,
);
