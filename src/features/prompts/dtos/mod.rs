pub mod prompt_dto;

pub use prompt_dto::{
    ActivateVersionDto, ActivationResultDto, ActiveContentDto, AddVersionDto, CreateDefinitionDto,
    DefinitionQueryParams, DefinitionResponseDto, DeleteDefinitionDto, SortDirection,
    VersionAddedDto, VersionContentDto,
};
