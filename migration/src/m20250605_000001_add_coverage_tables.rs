use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create employers table
        manager
            .create_table(
                Table::create()
                    .table(Employers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Employers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Employers::Name))
                    .col(string_uniq(Employers::RegistrationNo))
                    .col(string_null(Employers::ContactEmail))
                    .col(big_integer(Employers::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_employers_name")
                    .table(Employers::Table)
                    .col(Employers::Name)
                    .to_owned(),
            )
            .await?;

        // Create members table
        manager
            .create_table(
                Table::create()
                    .table(Members::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Members::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_uniq(Members::MemberNo))
                    .col(big_integer(Members::EmployerId))
                    .col(string(Members::FirstName))
                    .col(string(Members::LastName))
                    .col(string_null(Members::DateOfBirth))
                    .col(
                        ColumnDef::new(Members::Active)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(big_integer(Members::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_members_employer")
                            .from(Members::Table, Members::EmployerId)
                            .to(Employers::Table, Employers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_members_last_name")
                    .table(Members::Table)
                    .col(Members::LastName)
                    .to_owned(),
            )
            .await?;

        // Create insurers table
        manager
            .create_table(
                Table::create()
                    .table(Insurers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Insurers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Insurers::Name))
                    .col(string_uniq(Insurers::LicenseNo))
                    .col(string_null(Insurers::ContactEmail))
                    .col(big_integer(Insurers::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create providers table
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Providers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(Providers::Name))
                    .col(string(Providers::ProviderType))
                    .col(string_null(Providers::ContactEmail))
                    .col(big_integer(Providers::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create benefit_packages table
        manager
            .create_table(
                Table::create()
                    .table(BenefitPackages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BenefitPackages::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_uniq(BenefitPackages::Name))
                    .col(big_integer(BenefitPackages::AnnualLimit))
                    .col(string_null(BenefitPackages::Description))
                    .to_owned(),
            )
            .await?;

        // Create policies table
        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Policies::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_uniq(Policies::PolicyNo))
                    .col(big_integer(Policies::EmployerId))
                    .col(big_integer(Policies::InsurerId))
                    .col(big_integer(Policies::BenefitPackageId))
                    .col(string(Policies::StartDate))
                    .col(string(Policies::EndDate))
                    .col(string(Policies::Status))
                    .col(big_integer(Policies::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_policies_employer")
                            .from(Policies::Table, Policies::EmployerId)
                            .to(Employers::Table, Employers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_policies_insurer")
                            .from(Policies::Table, Policies::InsurerId)
                            .to(Insurers::Table, Insurers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_policies_benefit_package")
                            .from(Policies::Table, Policies::BenefitPackageId)
                            .to(BenefitPackages::Table, BenefitPackages::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Policies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BenefitPackages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Insurers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Members::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Employers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Employers {
    Table,
    Id,
    Name,
    RegistrationNo,
    ContactEmail,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Members {
    Table,
    Id,
    MemberNo,
    EmployerId,
    FirstName,
    LastName,
    DateOfBirth,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Insurers {
    Table,
    Id,
    Name,
    LicenseNo,
    ContactEmail,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
    Name,
    ProviderType,
    ContactEmail,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BenefitPackages {
    Table,
    Id,
    Name,
    AnnualLimit,
    Description,
}

#[derive(DeriveIden)]
enum Policies {
    Table,
    Id,
    PolicyNo,
    EmployerId,
    InsurerId,
    BenefitPackageId,
    StartDate,
    EndDate,
    Status,
    CreatedAt,
}
