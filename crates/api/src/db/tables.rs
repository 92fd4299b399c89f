//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    Name,
    PasswordHash,
    PasswordSalt,
    Role,
    PlanId,
    Credits,
    PrinterModel,
    DefaultOffsetX,
    DefaultOffsetY,
    CreatedAt,
    LastLoginAt,
}

#[derive(Iden)]
pub enum Projects {
    Table,
    Id,
    UserId,
    Name,
    CanvasJson,
    TemplateId,
    WidthMm,
    HeightMm,
    OffsetX,
    OffsetY,
    Thumbnail,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Templates {
    Table,
    Id,
    UserId,
    Name,
    Category,
    WidthMm,
    HeightMm,
    CreatedAt,
}

#[derive(Iden)]
pub enum Plans {
    Table,
    Id,
    Name,
    PriceCents,
    Credits,
    Description,
    IsActive,
    CreatedAt,
}

#[derive(Iden)]
pub enum Settings {
    Table,
    Key,
    Value,
    UpdatedAt,
}

#[derive(Iden)]
pub enum UserActivity {
    Table,
    Id,
    UserId,
    Action,
    Detail,
    CreatedAt,
}

#[derive(Iden)]
pub enum PrinterModels {
    Table,
    Name,
    AvgOffsetX,
    AvgOffsetY,
    SampleCount,
    UpdatedAt,
}

#[derive(Iden)]
pub enum PrintFeedback {
    Table,
    Id,
    UserId,
    ProjectId,
    PrinterModel,
    OffsetX,
    OffsetY,
    Outcome,
    Notes,
    CreatedAt,
}
