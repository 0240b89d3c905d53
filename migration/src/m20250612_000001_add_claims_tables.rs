use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create claims table
        manager
            .create_table(
                Table::create()
                    .table(Claims::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Claims::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_uniq(Claims::ClaimNo))
                    .col(big_integer(Claims::MemberId))
                    .col(big_integer(Claims::ProviderId))
                    .col(big_integer(Claims::PolicyId))
                    .col(big_integer(Claims::Amount))
                    .col(string(Claims::Status))
                    .col(string(Claims::IncidentDate))
                    .col(big_integer(Claims::SubmittedAt))
                    .col(big_integer_null(Claims::DecidedAt))
                    .col(string_null(Claims::DecidedBy))
                    .col(string_null(Claims::RejectionReason))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_member")
                            .from(Claims::Table, Claims::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_provider")
                            .from(Claims::Table, Claims::ProviderId)
                            .to(Providers::Table, Providers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_policy")
                            .from(Claims::Table, Claims::PolicyId)
                            .to(Policies::Table, Policies::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_claims_member")
                    .table(Claims::Table)
                    .col(Claims::MemberId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_claims_status")
                    .table(Claims::Table)
                    .col(Claims::Status)
                    .to_owned(),
            )
            .await?;

        // Create preapprovals table
        manager
            .create_table(
                Table::create()
                    .table(Preapprovals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Preapprovals::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(Preapprovals::MemberId))
                    .col(big_integer(Preapprovals::ProviderId))
                    .col(big_integer(Preapprovals::RequestedAmount))
                    .col(string(Preapprovals::Status))
                    .col(big_integer(Preapprovals::RequestedAt))
                    .col(big_integer_null(Preapprovals::DecidedAt))
                    .col(string_null(Preapprovals::DecidedBy))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_preapprovals_member")
                            .from(Preapprovals::Table, Preapprovals::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_preapprovals_provider")
                            .from(Preapprovals::Table, Preapprovals::ProviderId)
                            .to(Providers::Table, Providers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Create visits table
        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Visits::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(Visits::MemberId))
                    .col(big_integer(Visits::ProviderId))
                    .col(string(Visits::VisitDate))
                    .col(string_null(Visits::Diagnosis))
                    .col(big_integer_null(Visits::ClaimId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_member")
                            .from(Visits::Table, Visits::MemberId)
                            .to(Members::Table, Members::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_provider")
                            .from(Visits::Table, Visits::ProviderId)
                            .to(Providers::Table, Providers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_claim")
                            .from(Visits::Table, Visits::ClaimId)
                            .to(Claims::Table, Claims::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Create settlements table
        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settlements::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer_uniq(Settlements::ClaimId))
                    .col(big_integer(Settlements::Amount))
                    .col(big_integer(Settlements::SettledAt))
                    .col(string(Settlements::Reference))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_settlements_claim")
                            .from(Settlements::Table, Settlements::ClaimId)
                            .to(Claims::Table, Claims::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settlements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Preapprovals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Claims::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Claims {
    Table,
    Id,
    ClaimNo,
    MemberId,
    ProviderId,
    PolicyId,
    Amount,
    Status,
    IncidentDate,
    SubmittedAt,
    DecidedAt,
    DecidedBy,
    RejectionReason,
}

#[derive(DeriveIden)]
enum Preapprovals {
    Table,
    Id,
    MemberId,
    ProviderId,
    RequestedAmount,
    Status,
    RequestedAt,
    DecidedAt,
    DecidedBy,
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
    MemberId,
    ProviderId,
    VisitDate,
    Diagnosis,
    ClaimId,
}

#[derive(DeriveIden)]
enum Settlements {
    Table,
    Id,
    ClaimId,
    Amount,
    SettledAt,
    Reference,
}

#[derive(DeriveIden)]
enum Members {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Policies {
    Table,
    Id,
}
