//! Tenant user administration. Every route requires at least the manager role
//! and acts only within the caller's tenant.

use service_core::{
    axum::{
        extract::{Query, State},
        http::StatusCode,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::users::{
        parse_role, CreateUserRequest, CreateUserResponse, ListUsersQuery, UpdateRoleRequest,
        UpdateUserRequest, UserListResponse, UserResponse,
    },
    middleware::{Client, CurrentUser},
    services,
    utils::{PathId, ValidatedJson},
    AppState,
};

/// Create a user with a temporary password
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created; the temporary password is shown only here", body = CreateUserResponse),
        (status = 400, description = "Email exists or role invalid", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Caller cannot assign this role", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    let role = parse_role(&req.role)?;

    let created = state
        .users
        .create(
            &ctx,
            services::CreateUserRequest {
                email: req.email,
                first_name: req.first_name,
                last_name: req.last_name,
                role,
            },
            &client,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List users of the caller's tenant
#[utoipa::path(
    get,
    path = "/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "One page of users", body = UserListResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let page = state
        .users
        .list(ctx.tenant_id, query.page, query.limit)
        .await?;

    Ok(Json(UserListResponse::new(page, ctx.tenant_id)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User with their role in the caller's tenant", body = UserResponse),
        (status = 404, description = "No such user in this tenant", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    PathId(user_id): PathId,
) -> Result<Json<UserResponse>, AppError> {
    let member = state.users.get(ctx.tenant_id, user_id).await?;
    Ok(Json(UserResponse::in_tenant(member, ctx.tenant_id)))
}

/// Update name or active flag; omitted fields are left as they are
#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Caller does not outrank the user", body = crate::dtos::ErrorResponse),
        (status = 404, description = "No such user", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Client(client): Client,
    PathId(user_id): PathId,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let member = state
        .users
        .update(
            &ctx,
            user_id,
            services::UpdateUserRequest {
                first_name: req.first_name,
                last_name: req.last_name,
                is_active: req.is_active,
            },
            &client,
        )
        .await?;

    Ok(Json(UserResponse::in_tenant(member, ctx.tenant_id)))
}

/// Change a user's role in the caller's tenant
#[utoipa::path(
    patch,
    path = "/users/{id}/role",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "User with the new role", body = UserResponse),
        (status = 400, description = "Invalid role or user not in tenant", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Caller cannot assign or manage the roles involved", body = crate::dtos::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Client(client): Client,
    PathId(user_id): PathId,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let role = parse_role(&req.role)?;
    let member = state
        .users
        .update_role(&ctx, user_id, role, &client)
        .await?;

    Ok(Json(UserResponse::in_tenant(member, ctx.tenant_id)))
}
